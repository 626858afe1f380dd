pub mod extractor;
pub mod rate_limit;
pub mod test_utils;
