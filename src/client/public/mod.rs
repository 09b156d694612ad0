mod connect_ops;
mod job_ops;
mod queue_ops;
use super::{builder::ClientBuilder, Client};

impl Client {
    /// Create an instance of [`ClientBuilder`]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Name of the schema this client operates in.
    pub fn schema(&self) -> &str {
        &self.opts.schema
    }
}
