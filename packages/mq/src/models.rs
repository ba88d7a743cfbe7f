/// A message fetched from (or published to) a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: Option<String>,
    pub value: Vec<u8>,
    /// Broker position of the message; the handle used to commit it.
    /// Empty for messages that have not been fetched.
    pub offset: String,
}

impl Message {
    /// A message to publish.
    pub fn new(key: Option<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key,
            value: value.into(),
            offset: String::new(),
        }
    }
}
