pub mod upstream_request;
