mod support;

mod notify_test;
mod session_test;
