use super::{Error, PathMapper};

/// Identity mapper for setups without compiled proxy classes. Messages pass
/// through untouched in both directions.
pub struct DummyPathMapper;

impl PathMapper for DummyPathMapper {
    fn apply_to_outbound(&self, message: &[u8]) -> Vec<u8> {
        message.to_vec()
    }

    fn apply_to_inbound(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(message.to_vec())
    }
}
