use std::fmt::{Display, Formatter};

use tfidx_primitives::BlockNumber;


#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum FetchErrorKind {
    /// The requested height lies beyond the chain head.
    NotFoundYet,
    /// Network/RPC hiccup, the same request may succeed later.
    Transient,
    /// The endpoint rejected the request, retrying is pointless.
    Fatal
}


/// Error returned by a chain client. Serializable so it can cross
/// the worker-process pipe unchanged.
#[derive(Debug, Clone)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String
}


impl FetchError {
    pub fn not_found_yet(height: BlockNumber) -> Self {
        Self {
            kind: FetchErrorKind::NotFoundYet,
            message: format!("block {} does not exist yet", height)
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into()
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Fatal,
            message: message.into()
        }
    }

    pub fn is_not_found_yet(&self) -> bool {
        self.kind == FetchErrorKind::NotFoundYet
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}


impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FetchErrorKind::NotFoundYet => write!(f, "not found yet: {}", self.message),
            FetchErrorKind::Transient => write!(f, "transient fetch error: {}", self.message),
            FetchErrorKind::Fatal => write!(f, "fatal fetch error: {}", self.message)
        }
    }
}


impl std::error::Error for FetchError {}
