use std::collections::HashMap;
use uuid::Uuid;

pub type Argv = Vec<String>;
pub type Dir = std::path::PathBuf;
pub type EnvMap = HashMap<String, String>;
pub type JobId = Uuid;
pub type OutputBlob = bytes::Bytes;
