pub mod idle;
pub mod injector;
pub mod polar_file;
pub mod script;
pub mod window;
