pub mod api_util;
pub mod cipher_util;
pub mod rate_limit;
pub mod scoring;
