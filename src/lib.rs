//! # apk-introspect
//!
//! A library for reading and patching the binary `AndroidManifest.xml` of APK files
//!
//! ```no_run
//!  use apk_introspect::android::apk::Apk;
//!
//!  let apk = Apk::open("app.apk").unwrap();
//!  println!("{} {}", apk.package_name().unwrap(), apk.version_name().unwrap());
//!  if !apk.is_debuggable().unwrap() {
//!      apk.write_debuggable("app-debuggable.apk").unwrap();
//!  }
//! ```
//!
//! The decoder works on raw manifest bytes too:
//!
//! ```no_run
//!  use apk_introspect::android::binary_xml::{get_element_attributes, render_as_xml_text};
//!
//!  let bytes = std::fs::read("AndroidManifest.xml").unwrap();
//!  println!("{}", render_as_xml_text(&bytes).unwrap());
//!  let application = get_element_attributes(&bytes, &["application"]).unwrap();
//!  println!("{:?}", application.get("debuggable"));
//! ```

pub mod android;
#[cfg(test)]
mod tests;

pub use android::apk::{Apk, ApkError, ApkProperties, ApkResult, ANDROID_MANIFEST};
pub use android::binary_xml::{BinaryXmlError, BinaryXmlResult};
pub use android::zip::{ApkFile, ArchiveReader};
