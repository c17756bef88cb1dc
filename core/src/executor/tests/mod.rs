mod helpers;
mod stdlib_tests;
mod typeck_tests;
