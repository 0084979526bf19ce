//! Shared state and messaging between the pipeline and the UI
//!
//! Pipeline threads never touch the overlay; they publish frames into the
//! preview slot and send detection results through the UI channel.

pub mod messages;
pub mod state;

pub use messages::{drain, PipelineToUi, UiDispatcher};
pub use state::{PipelineStatus, PreviewSlot};
