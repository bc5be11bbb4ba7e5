pub mod buffer;
pub mod client_hello;
pub mod server_hello;

pub use buffer::ByteAccumulator;
pub use client_hello::TlsVersion;
pub use server_hello::ServerHello;
