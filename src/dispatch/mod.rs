//! Client job dispatch: work queue, canvas and the session-driving loop.

mod canvas;
mod dispatcher;
mod work_queue;

pub use canvas::Canvas;
pub use dispatcher::{Dispatcher, RenderOutcome, RenderStats, SessionStats};
pub use work_queue::{ItemState, WorkQueue};
