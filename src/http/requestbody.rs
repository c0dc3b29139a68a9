//! Payload sent with POST/PUT requests.

use bytes::Bytes;

/// An explicit request payload.
///
/// When set it wins over form parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
}

macro_rules! owned_into_body {
    ($($ty:ty),*) => {
        $(impl From<$ty> for RequestBody {
            fn from(value: $ty) -> Self {
                RequestBody::Bytes(Bytes::from(value))
            }
        })*
    };
}

owned_into_body!(String, Vec<u8>, Bytes);

impl<'a> From<&'a str> for RequestBody {
    fn from(value: &'a str) -> Self {
        value.as_bytes().into()
    }
}

impl<'a> From<&'a [u8]> for RequestBody {
    fn from(value: &'a [u8]) -> Self {
        RequestBody::Bytes(Bytes::copy_from_slice(value))
    }
}

impl RequestBody {
    fn bytes(&self) -> Option<&Bytes> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Bytes(b) => Some(b),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.bytes().map_or(0, Bytes::len)
    }

    /// The payload as sent on the wire; shares the underlying buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.bytes().cloned().unwrap_or_default()
    }
}
