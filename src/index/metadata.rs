use crate::core::error::{Error, Result};
use crate::storage::block::MAX_KEY_LEN;

/// User metadata keys are stored as-is; they must fit a table key.
pub fn check_metadata_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("empty metadata key"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::invalid_argument(format!(
            "metadata key of {} bytes is longer than {}", key.len(), MAX_KEY_LEN
        )));
    }
    Ok(())
}
