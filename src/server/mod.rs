pub mod app_state;
pub mod dispatcher;
pub mod registry;

pub use app_state::AppState;
pub use dispatcher::CommandDispatcher;
pub use registry::SessionRegistry;
