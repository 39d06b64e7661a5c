mod build_tests;
mod bundler_tests;
mod common;
mod server_tests;
