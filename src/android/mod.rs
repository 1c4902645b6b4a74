pub mod apk;
pub mod binary_xml;
pub mod zip;
