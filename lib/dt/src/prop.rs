use alloc::{boxed::Box, vec::Vec};
use core::str;

/// One property of a tree node. `data` keeps the FDT wire encoding:
/// integers are big-endian, strings are NUL-terminated.
pub struct Property {
    pub name: Box<str>,
    pub data: Box<[u8]>,
}

impl Property {
    pub fn new(name: &str, data: &[u8]) -> Property {
        Property {
            name: Box::from(name),
            data: Box::from(data),
        }
    }

    pub fn from_u32(name: &str, value: u32) -> Property {
        Property::new(name, &value.to_be_bytes())
    }

    pub fn from_str(name: &str, value: &str) -> Property {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        Property {
            name: Box::from(name),
            data: data.into_boxed_slice(),
        }
    }

    pub fn from_strlist(name: &str, values: &[&str]) -> Property {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        Property {
            name: Box::from(name),
            data: data.into_boxed_slice(),
        }
    }
}

impl Property {
    pub fn value_as_u32(&self) -> Result<u32, PropertyError> {
        let bytes: [u8; 4] = self
            .data
            .get(..4)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(PropertyError::InvalidPropFormat)?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn value_as_str(&self) -> Result<&str, PropertyError> {
        let text = str::from_utf8(&self.data).map_err(|_| PropertyError::InvalidPropFormat)?;
        Ok(text.trim_end_matches('\0'))
    }

    pub fn value_as_strlist(&self) -> Result<Vec<&str>, PropertyError> {
        let mut res = Vec::new();
        for chunk in self.data.split(|&b| b == 0) {
            if chunk.is_empty() {
                continue;
            }
            res.push(str::from_utf8(chunk).map_err(|_| PropertyError::InvalidPropFormat)?);
        }
        Ok(res)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    InvalidPropFormat,
}
