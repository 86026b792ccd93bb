//! Wire types for llama invocations.
//!
//! Pure data, serde only. The client builds an [`InvocationSpec`], the
//! backend answers with an [`InvocationResponse`]. Everything bulky travels
//! as a [`Blob`] reference into the shared store.

mod arg;
mod invoke;
mod spec;

pub use arg::Arg;
pub use invoke::{InvokeReply, InvokeRequest};
pub use spec::{InvocationResponse, InvocationSpec, SpecError, validate_destination};

pub use llama_store::{Blob, File, FileMode};
