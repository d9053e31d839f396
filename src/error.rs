//! Error types for 3MF placement operations
//!
//! Error codes follow the pattern `E<category><number>`:
//!
//! - **E1xxx**: I/O and archive errors
//! - **E2xxx**: XML parsing and structure errors
//! - **E3xxx**: Model and transform-request errors
//! - **E4xxx**: Placement validation and external slicer errors

use std::io;
use thiserror::Error;

/// Result type for placement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, editing, or validating 3MF containers
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading or writing the container
    ///
    /// **Error Code**: E1001
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// ZIP archive error
    ///
    /// **Error Code**: E1002
    ///
    /// **Common Causes**:
    /// - Corrupted ZIP file
    /// - Truncated archive
    /// - Unsupported compression method
    #[error("[E1002] ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Missing required file in the 3MF archive
    ///
    /// **Error Code**: E1003
    ///
    /// Every 3MF container must carry `3D/3dmodel.model`; vendor metadata
    /// parts are optional and their absence is never this error.
    #[error("[E1003] Missing required file: {0}")]
    MissingFile(String),

    /// XML parsing error
    ///
    /// **Error Code**: E2001
    #[error("[E2001] XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML attribute error
    ///
    /// **Error Code**: E2002
    #[error("[E2002] XML attribute error: {0}")]
    XmlAttr(String),

    /// Invalid XML structure
    ///
    /// **Error Code**: E2003
    ///
    /// **Common Causes**:
    /// - Missing required XML elements (e.g. a `<build>` section)
    /// - Missing required attributes
    /// - Invalid element nesting
    #[error("[E2003] Invalid XML structure: {0}")]
    InvalidXml(String),

    /// Invalid 3MF container format
    ///
    /// **Error Code**: E2004
    ///
    /// **Common Causes**:
    /// - Model part is not valid UTF-8
    /// - Non-ZIP payload uploaded as a 3MF
    #[error("[E2004] Invalid 3MF format: {0}")]
    InvalidFormat(String),

    /// Invalid model structure
    ///
    /// **Error Code**: E3001
    ///
    /// **Common Causes**:
    /// - Build item or component references a non-existent object
    /// - Component nesting too deep
    /// - Plate index out of range
    #[error("[E3001] Invalid model: {0}")]
    InvalidModel(String),

    /// Parse error for numeric values
    ///
    /// **Error Code**: E3002
    #[error("[E3002] Parse error: {0}")]
    ParseError(String),

    /// Invalid object transform request
    ///
    /// **Error Code**: E3003
    ///
    /// **Common Causes**:
    /// - `build_item_index` out of range or duplicated
    /// - `object_id` cross-check mismatch
    #[error("[E3003] Invalid object transforms: {0}")]
    InvalidEdit(String),

    /// Placement validation failure
    ///
    /// **Error Code**: E4001
    ///
    /// Raised before slicer invocation when the transformed layout would
    /// leave no printable object fully inside the print volume. The message
    /// carries the fixed substring `"fully inside the print volume"` that
    /// API callers depend on.
    #[error("[E4001] {0}")]
    Validation(String),

    /// External slicer binary failure
    ///
    /// **Error Code**: E4002
    ///
    /// Carries the binary's own diagnostic text. A narrow set of known
    /// wipe-tower conflict signatures (see [`crate::slicer`]) justifies one
    /// automatic retry with the prime tower disabled; everything else is
    /// surfaced as-is.
    #[error("[E4002] External slicer failed: {0}")]
    ExternalSlicer(String),
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::ParseError(format!("Failed to parse floating-point number: {}", err))
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::ParseError(format!("Failed to parse integer: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlAttr(format!("Attribute parsing failed: {}", err))
    }
}

impl Error {
    /// Create an InvalidXml error with element context
    pub fn invalid_xml_element(element: &str, message: &str) -> Self {
        Error::InvalidXml(format!("Element '<{}>': {}", element, message))
    }

    /// Create an InvalidXml error for a missing required attribute
    pub fn missing_attribute(element: &str, attribute: &str) -> Self {
        Error::InvalidXml(format!(
            "Element '<{}>' is missing required attribute '{}'",
            element, attribute
        ))
    }

    /// Create a ParseError with context about what was being parsed
    pub fn parse_error_with_context(field_name: &str, value: &str, expected_type: &str) -> Self {
        Error::ParseError(format!(
            "Failed to parse '{}': expected {}, got '{}'",
            field_name, expected_type, value
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "test"));
        assert!(io_err.to_string().contains("[E1001]"));

        let missing_file = Error::MissingFile("3D/3dmodel.model".to_string());
        assert!(missing_file.to_string().contains("[E1003]"));

        let invalid_model = Error::InvalidModel("test error".to_string());
        assert!(invalid_model.to_string().contains("[E3001]"));

        let edit = Error::InvalidEdit("duplicate build_item_index".to_string());
        assert!(edit.to_string().contains("[E3003]"));
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        // The validation variant must not decorate the message: callers match
        // on a fixed substring of it.
        let err = Error::Validation(
            "Object transforms place plate 2 so no printable object is fully inside the print volume".to_string(),
        );
        assert!(err.to_string().contains("fully inside the print volume"));
    }

    #[test]
    fn test_missing_attribute_helper() {
        let err = Error::missing_attribute("item", "objectid");
        assert!(err.to_string().contains("Element '<item>'"));
        assert!(err.to_string().contains("'objectid'"));
        assert!(err.to_string().contains("[E2003]"));
    }

    #[test]
    fn test_parse_float_error_conversion() {
        let parse_err: std::num::ParseFloatError = "not_a_number".parse::<f64>().unwrap_err();
        let err = Error::from(parse_err);
        assert!(err.to_string().contains("[E3002]"));
    }
}
