pub mod prompts;
pub mod stream;
pub mod types;

#[cfg(feature = "gemini")]
pub mod client;
#[cfg(feature = "gemini")]
pub mod session;

pub use prompts::*;
pub use stream::*;
pub use types::*;

#[cfg(feature = "gemini")]
pub use client::*;
#[cfg(feature = "gemini")]
pub use session::*;
