use tokio::sync::oneshot;
use uuid::Uuid;

/// Everything the platform backend reports to the GATT server.
///
/// Requests that owe the central an answer carry a `responder`; the request is pending until
/// exactly one response has been sent through it. Writes made without response (ATT write
/// commands) arrive with `responder: None` and must never be answered.
#[derive(Debug)]
pub enum PeripheralEvent {
    StateUpdate {
        is_powered: bool,
    },
    ConnectionUpdate {
        client: String,
        connected: bool,
    },
    ReadRequest {
        request: PeripheralRequest,
        offset: u64,
        responder: oneshot::Sender<ReadRequestResponse>,
    },
    WriteRequest {
        request: PeripheralRequest,
        value: Vec<u8>,
        offset: u64,
        responder: Option<oneshot::Sender<WriteRequestResponse>>,
    },
    DescriptorReadRequest {
        request: DescriptorRequest,
        offset: u64,
        responder: oneshot::Sender<ReadRequestResponse>,
    },
    DescriptorWriteRequest {
        request: DescriptorRequest,
        value: Vec<u8>,
        offset: u64,
        responder: Option<oneshot::Sender<WriteRequestResponse>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralRequest {
    pub client: String,
    pub service: Uuid,
    pub characteristic: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRequest {
    pub client: String,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Uuid,
}

#[derive(Debug, PartialEq)]
pub struct ReadRequestResponse {
    pub value: Vec<u8>,
    pub response: RequestResponse,
}

impl ReadRequestResponse {
    pub fn success(value: Vec<u8>) -> Self {
        ReadRequestResponse {
            value,
            response: RequestResponse::Success,
        }
    }

    pub fn error(response: RequestResponse) -> Self {
        ReadRequestResponse {
            value: Vec::new(),
            response,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct WriteRequestResponse {
    pub response: RequestResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResponse {
    Success,
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    RequestNotSupported,
    InvalidOffset,
    InvalidAttributeValueLength,
    UnlikelyError,
    ImproperlyConfigured,
}

impl RequestResponse {
    /// ATT status code sent on the wire for this response.
    pub fn att_code(&self) -> u8 {
        match self {
            RequestResponse::Success => 0x00,
            RequestResponse::InvalidHandle => 0x01,
            RequestResponse::ReadNotPermitted => 0x02,
            RequestResponse::WriteNotPermitted => 0x03,
            RequestResponse::RequestNotSupported => 0x06,
            RequestResponse::InvalidOffset => 0x07,
            RequestResponse::InvalidAttributeValueLength => 0x0d,
            RequestResponse::UnlikelyError => 0x0e,
            RequestResponse::ImproperlyConfigured => 0xfd,
        }
    }
}
