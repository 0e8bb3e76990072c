//! Closed message families (commands, events) and their typed variants.
//!
//! Every entity declares one enum of commands and one enum of events. Each variant
//! wraps a dedicated payload struct and carries a stable type name. Handlers are
//! registered per payload type through [`Variant`], and registration is checked
//! against [`Message::declared_types`].
//!
//! The [`impl_message!`](crate::impl_message) macro derives both traits:
//!
//! ```ignore
//! impl_message!(CounterEvent {
//!     Increased(ValueIncreased) => "ValueIncreased",
//!     Reset(ValueReset) => "ValueReset",
//! });
//! ```

use core::fmt::Debug;

/// A closed family of messages with stable type names.
pub trait Message: Clone + Debug + Send + Sync + 'static {
    /// Stable type name of this message (used for routing and persistence).
    fn message_type(&self) -> &'static str;

    /// Every type name the family can produce.
    fn declared_types() -> &'static [&'static str];
}

/// One payload type of a message family `M`.
pub trait Variant<M>: Sized + Send + 'static {
    /// Stable type name, matches `M::message_type` for values of this variant.
    const TYPE: &'static str;

    /// Extract the payload, if `m` is this variant.
    fn take(m: M) -> Option<Self>;

    /// Borrow the payload, if `m` is this variant.
    fn peek(m: &M) -> Option<&Self>;
}

/// Derive [`Message`] and one [`Variant`] impl per variant for a message enum.
///
/// Each variant must be a single-field tuple variant with a distinct payload type.
#[macro_export]
macro_rules! impl_message {
    ($msg:ident { $($variant:ident($payload:ty) => $name:literal),+ $(,)? }) => {
        impl $crate::message::Message for $msg {
            fn message_type(&self) -> &'static str {
                match self {
                    $( Self::$variant(_) => $name, )+
                }
            }

            fn declared_types() -> &'static [&'static str] {
                &[$($name),+]
            }
        }

        $(
            impl $crate::message::Variant<$msg> for $payload {
                const TYPE: &'static str = $name;

                fn take(m: $msg) -> Option<Self> {
                    #[allow(unreachable_patterns)]
                    match m {
                        $msg::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn peek(m: &$msg) -> Option<&Self> {
                    #[allow(unreachable_patterns)]
                    match m {
                        $msg::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )+
    };
}
