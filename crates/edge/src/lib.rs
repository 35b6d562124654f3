pub mod dispatcher;
pub mod http_listener;

pub use dispatcher::Dispatcher;
pub use http_listener::HttpListener;
