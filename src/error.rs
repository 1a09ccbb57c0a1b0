use std::{error, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Bluez,
    PermissionDenied,
    ChannelError,
    Advertising,
    Notification,
}

impl From<ErrorType> for &'static str {
    fn from(error_type: ErrorType) -> &'static str {
        match error_type {
            ErrorType::Bluez => "Bluez",
            ErrorType::PermissionDenied => "PermissionDenied",
            ErrorType::ChannelError => "ChannelError",
            ErrorType::Advertising => "Advertising",
            ErrorType::Notification => "Notification",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_type: &str = (*self).into();
        write!(f, "<BleCounterPeripheral {} Error>", error_type)
    }
}

impl error::Error for ErrorType {}

#[derive(Debug, Clone)]
pub struct Error {
    name: String,
    description: String,
    error_type: ErrorType,
}

impl Error {
    pub fn new<T: Into<String>>(name: T, description: T, error_type: ErrorType) -> Self {
        Error {
            name: name.into(),
            description: description.into(),
            error_type,
        }
    }

    pub fn from_type(error_type: ErrorType) -> Self {
        Error {
            name: error_type.to_string(),
            description: error_type.to_string(),
            error_type,
        }
    }

    pub fn from_string(error: String, error_type: ErrorType) -> Self {
        Error {
            name: error_type.to_string(),
            description: error,
            error_type,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::new(
            "Peripheral event",
            "the event channel is closed",
            ErrorType::ChannelError,
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_type: &str = self.error_type.into();
        write!(f, "{} ({}): {}", self.name, error_type, self.description)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error_type)
    }
}
