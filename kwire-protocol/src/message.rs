//! The polymorphic message abstraction.

use crate::api::ApiKey;
use crate::stream::ByteStream;
use std::any::Any;
use std::fmt;

/// Whether a message travels client→broker or broker→client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRole {
    Request,
    Response,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::Request => write!(f, "request"),
            MessageRole::Response => write!(f, "response"),
        }
    }
}

/// One request or response kind.
///
/// Encoding and decoding are looked up in the registry by the concrete type
/// and by API key respectively, so implementors only describe identity.
pub trait Message: Any + fmt::Debug + Send + Sync {
    /// The API key of the kind this message belongs to.
    fn api_key(&self) -> ApiKey;

    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// One-shot streams held by this message, in a stable traversal order.
    fn streams(&self) -> Vec<&ByteStream> {
        Vec::new()
    }
}

impl<'a> dyn Message + 'a {
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Implements [`Message`] for a type without streamable fields.
macro_rules! impl_message {
    ($ty:ty, $key:expr) => {
        impl $crate::message::Message for $ty {
            fn api_key(&self) -> $crate::api::ApiKey {
                $key
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}

pub(crate) use impl_message;
