pub mod subscription_reader;
pub mod subscription_writer;
