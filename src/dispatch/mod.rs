//! Callback and async-report delivery.

mod dispatcher;
mod report;

pub use dispatcher::{Dispatcher, callback_headers};
pub use report::AsyncReport;
