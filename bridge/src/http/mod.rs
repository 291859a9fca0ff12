mod dto;
mod error;
mod handlers;
mod server;
mod state;


pub use dto::{ApplyRequest, ApplyResponse, DiffRequest, DiffResponse, ErrorResponse, ListUnitsResponse};
pub use error::{ApiError, ApiResult};
pub use server::{router, start_server};
pub use state::AppState;
