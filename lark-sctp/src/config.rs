use std::sync::Arc;

/// Parameters governing one association's transport behavior.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    max_message_size: u32,
    max_num_outbound_streams: u16,
    max_num_inbound_streams: u16,
    max_receive_buffer_size: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            max_message_size: 262_144,
            max_num_outbound_streams: 1024,
            max_num_inbound_streams: 1024,
            max_receive_buffer_size: 1024 * 1024,
        }
    }
}

impl TransportConfig {
    /// The largest user message accepted by `write`; bigger sends fail.
    pub fn with_max_message_size(mut self, value: u32) -> Self {
        self.max_message_size = value;
        self
    }

    pub fn with_max_num_outbound_streams(mut self, value: u16) -> Self {
        self.max_num_outbound_streams = value;
        self
    }

    pub fn with_max_num_inbound_streams(mut self, value: u16) -> Self {
        self.max_num_inbound_streams = value;
        self
    }

    pub fn with_max_receive_buffer_size(mut self, value: u32) -> Self {
        self.max_receive_buffer_size = value;
        self
    }

    pub fn max_message_size(&self) -> u32 {
        self.max_message_size
    }

    pub fn max_num_outbound_streams(&self) -> u16 {
        self.max_num_outbound_streams
    }

    pub fn max_num_inbound_streams(&self) -> u16 {
        self.max_num_inbound_streams
    }

    pub fn max_receive_buffer_size(&self) -> u32 {
        self.max_receive_buffer_size
    }
}

/// Global endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    max_payload_size: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            // DTLS leaves roughly this much room in a standard MTU
            max_payload_size: 1200,
        }
    }
}

impl EndpointConfig {
    pub fn new() -> Self {
        EndpointConfig::default()
    }

    /// Maximum datagram this endpoint will emit, headers included.
    pub fn with_max_payload_size(mut self, value: u32) -> Self {
        self.max_payload_size = value;
        self
    }

    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }
}

/// Parameters for outgoing associations.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub transport: Arc<TransportConfig>,
}

/// Parameters for accepting incoming associations.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub transport: Arc<TransportConfig>,
    /// Maximum number of concurrent associations.
    pub concurrent_associations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            transport: Arc::new(TransportConfig::default()),
            concurrent_associations: 1024,
        }
    }
}
