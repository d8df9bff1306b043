mod atomic_tests;
mod credentials_tests;
