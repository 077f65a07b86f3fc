pub mod test_http_backend;
pub mod test_request_flow;
