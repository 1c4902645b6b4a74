use crate::android::binary_xml::{
    get_element_attributes, has_element, is_valid_manifest, render_as_xml_text,
    render_with_options, set_attribute, BinaryXmlDocument, BinaryXmlError, RenderOptions,
    StringPool, ANDROID_NAMESPACE_URI,
};
use crate::tests::fixtures::{
    bare_application_manifest, manifest_without_application, sample_manifest, FixtureAttr,
    FixtureBuilder, ATTR_DEBUGGABLE, ATTR_NAME,
};

const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest versionCode="7" versionName="1.2.3" package="com.example.app">
  <uses-sdk minSdkVersion="21">
  </uses-sdk>
  <application label="@res/0x7F010000">
    <activity name=".MainActivity">
    </activity>
  </application>
</manifest>
"#;

#[test]
fn renders_sample_manifest() {
    let text = render_as_xml_text(&sample_manifest(None)).expect("render");
    assert_eq!(text, SAMPLE_XML);
}

#[test]
fn every_start_tag_gets_one_close_tag() {
    let text = render_as_xml_text(&sample_manifest(Some(true))).expect("render");
    let tags: Vec<&str> = text
        .lines()
        .skip(1)
        .map(str::trim_start)
        .collect();
    let closes = tags.iter().filter(|line| line.starts_with("</")).count();
    let opens = tags.len() - closes;
    assert_eq!(opens, 4);
    assert_eq!(closes, 4);
}

#[test]
fn render_options_control_layout() {
    let options = RenderOptions {
        indent: 4,
        xml_declaration: false,
    };
    let text = render_with_options(&sample_manifest(None), options).expect("render");
    assert!(text.starts_with("<manifest "));
    assert!(text.contains("\n    <uses-sdk minSdkVersion=\"21\">\n"));
    assert!(text.contains("\n        <activity name=\".MainActivity\">\n"));
}

#[test]
fn attribute_queries_are_idempotent() {
    let manifest = sample_manifest(None);
    let first = get_element_attributes(&manifest, &["manifest"]).expect("first");
    let second = get_element_attributes(&manifest, &["manifest"]).expect("second");
    assert_eq!(first, second);
    assert_eq!(
        first.keys().collect::<Vec<_>>(),
        vec!["versionCode", "versionName", "package"]
    );
}

#[test]
fn paths_match_innermost_open_tags() {
    let manifest = sample_manifest(None);
    let nested = get_element_attributes(&manifest, &["manifest", "application", "activity"])
        .expect("full path");
    assert_eq!(nested["name"], ".MainActivity");
    let short = get_element_attributes(&manifest, &["activity"]).expect("suffix");
    assert_eq!(nested, short);
    assert!(matches!(
        get_element_attributes(&manifest, &["uses-sdk", "application"]),
        Err(BinaryXmlError::MalformedManifest(_))
    ));
}

#[test]
fn validity_follows_application_tag() {
    assert!(is_valid_manifest(&sample_manifest(None)).expect("sample"));
    assert!(is_valid_manifest(&bare_application_manifest()).expect("bare"));
    assert!(!is_valid_manifest(&manifest_without_application()).expect("no application"));
    assert!(has_element(&manifest_without_application(), "uses-permission").expect("probe"));
}

#[test]
fn adding_debuggable_round_trips() {
    let manifest = sample_manifest(None);
    let patched = set_attribute(&manifest, &["application"], "debuggable", "true").expect("patch");
    assert_ne!(patched, manifest);

    let attributes = get_element_attributes(&patched, &["application"]).expect("query");
    assert_eq!(attributes["debuggable"], "true");
    assert!(is_valid_manifest(&patched).expect("valid"));
    assert_eq!(
        render_as_xml_text(&patched).expect("render"),
        SAMPLE_XML.replace(
            "<application label=\"@res/0x7F010000\">",
            "<application label=\"@res/0x7F010000\" debuggable=\"true\">"
        )
    );

    let document = BinaryXmlDocument::from_bytes(&patched).expect("decode");
    assert_eq!(document.resource_id_of("debuggable"), Some(ATTR_DEBUGGABLE));
    let namespace = document
        .strings()
        .iter()
        .position(|s| s == ANDROID_NAMESPACE_URI);
    assert!(namespace.is_some());

    // Patching twice changes nothing further.
    let again =
        set_attribute(&patched, &["application"], "android:debuggable", "true").expect("again");
    assert_eq!(again, patched);
}

#[test]
fn overwrites_existing_debuggable() {
    let manifest = sample_manifest(Some(false));
    let patched = set_attribute(&manifest, &["application"], "debuggable", "true").expect("patch");
    assert_eq!(patched.len(), manifest.len());
    let attributes = get_element_attributes(&patched, &["application"]).expect("query");
    assert_eq!(attributes["debuggable"], "true");
    assert_eq!(attributes.len(), 2);
}

#[test]
fn sets_typed_values_on_nested_elements() {
    let manifest = sample_manifest(None);
    let patched = set_attribute(&manifest, &["application", "activity"], "exported", "false")
        .expect("exported");
    let patched = set_attribute(&patched, &["uses-sdk"], "targetSdkVersion", "34").expect("sdk");
    let patched = set_attribute(&patched, &["manifest"], "versionName", "2.0").expect("name");

    let activity = get_element_attributes(&patched, &["activity"]).expect("activity");
    assert_eq!(activity["exported"], "false");
    let sdk = get_element_attributes(&patched, &["uses-sdk"]).expect("uses-sdk");
    assert_eq!(sdk["minSdkVersion"], "21");
    assert_eq!(sdk["targetSdkVersion"], "34");
    let root = get_element_attributes(&patched, &["manifest"]).expect("manifest");
    assert_eq!(root["versionName"], "2.0");
    assert_eq!(root["versionCode"], "7");
    assert_eq!(root["package"], "com.example.app");
}

#[test]
fn patches_every_element_matching_the_path() {
    let mut builder = FixtureBuilder::utf8();
    builder
        .map_attribute("name", ATTR_NAME)
        .start_namespace("android", ANDROID_NAMESPACE_URI)
        .start_element("manifest", &[FixtureAttr::string("package", "com.example.app")])
        .start_element("application", &[])
        .start_element("activity", &[FixtureAttr::string("name", ".MainActivity").android()])
        .end_element("activity")
        .start_element("activity", &[FixtureAttr::string("name", ".SettingsActivity").android()])
        .end_element("activity")
        .end_element("application")
        .end_element("manifest")
        .end_namespace("android", ANDROID_NAMESPACE_URI);
    let manifest = builder.build();

    let patched = set_attribute(&manifest, &["application", "activity"], "exported", "true")
        .expect("exported");
    assert_eq!(
        render_as_xml_text(&patched).expect("render"),
        r#"<?xml version="1.0" encoding="utf-8"?>
<manifest package="com.example.app">
  <application>
    <activity name=".MainActivity" exported="true">
    </activity>
    <activity name=".SettingsActivity" exported="true">
    </activity>
  </application>
</manifest>
"#
    );
}

#[test]
fn missing_target_is_malformed_and_input_untouched() {
    let manifest = manifest_without_application();
    let before = manifest.clone();
    assert!(matches!(
        set_attribute(&manifest, &["application"], "debuggable", "true"),
        Err(BinaryXmlError::MalformedManifest(_))
    ));
    assert_eq!(manifest, before);
    assert!(matches!(
        get_element_attributes(&manifest, &["application"]),
        Err(BinaryXmlError::MalformedManifest(_))
    ));
}

#[test]
fn corrupt_header_is_invalid_everywhere() {
    let mut manifest = sample_manifest(None);
    manifest[1] = 0x7F;
    assert!(StringPool::read(&manifest).expect("soft failure").is_empty());
    assert!(matches!(render_as_xml_text(&manifest), Err(BinaryXmlError::InvalidDocument(_))));
    assert!(matches!(is_valid_manifest(&manifest), Err(BinaryXmlError::InvalidDocument(_))));
    assert!(matches!(
        get_element_attributes(&manifest, &["manifest"]),
        Err(BinaryXmlError::InvalidDocument(_))
    ));
    assert!(matches!(
        set_attribute(&manifest, &["application"], "debuggable", "true"),
        Err(BinaryXmlError::InvalidDocument(_))
    ));
}

#[test]
fn short_buffers_are_invalid() {
    for len in [0, 4, 35] {
        let manifest = sample_manifest(None);
        assert!(matches!(
            render_as_xml_text(&manifest[..len]),
            Err(BinaryXmlError::InvalidDocument(_))
        ));
    }
}

#[test]
fn cdata_is_not_rendered() {
    let mut builder = FixtureBuilder::utf8();
    builder
        .start_element("manifest", &[])
        .start_element("application", &[])
        .cdata("some text")
        .end_element("application")
        .end_element("manifest");
    let text = render_as_xml_text(&builder.build()).expect("render");
    assert!(!text.contains("some text"));
    assert!(text.contains("  <application>\n  </application>\n"));
}

#[test]
fn decodes_empty_and_non_ascii_strings() {
    for mut builder in [FixtureBuilder::utf8(), FixtureBuilder::utf16()] {
        builder
            .start_element(
                "application",
                &[
                    FixtureAttr::string("label", "Grüße 日本"),
                    FixtureAttr::string("description", ""),
                    FixtureAttr::string("process", "abc"),
                ],
            )
            .end_element("application");
        let attributes = get_element_attributes(&builder.build(), &["application"]).expect("query");
        assert_eq!(attributes["label"], "Grüße 日本");
        assert_eq!(attributes["description"], "");
        assert_eq!(attributes["process"], "abc");
    }
}

#[test]
fn renders_typed_values() {
    let mut builder = FixtureBuilder::utf8();
    builder
        .start_element(
            "application",
            &[
                FixtureAttr::typed("flags", 0x11, 0x0000_00FF),
                FixtureAttr::typed("theme", 0x02, 0x0101_0000),
                FixtureAttr::typed("dynamic", 0x07, 0x7F00_0001),
                FixtureAttr::typed("weird", 0x12, 7),
                FixtureAttr::typed("size", 0x05, 0x0000_1001),
                FixtureAttr::int("negative", -2),
                FixtureAttr::typed("nothing", 0x00, 0),
                FixtureAttr::typed("empty", 0x00, 1),
            ],
        )
        .end_element("application");
    let attributes = get_element_attributes(&builder.build(), &["application"]).expect("query");
    assert_eq!(attributes["flags"], "0x000000FF");
    assert_eq!(attributes["theme"], "@attr/0x01010000");
    assert_eq!(attributes["dynamic"], "@dyn/0x7F000001");
    assert_eq!(attributes["weird"], "unknown");
    assert_eq!(attributes["size"], "");
    assert_eq!(attributes["negative"], "-2");
    assert_eq!(attributes["nothing"], "<undefined>");
    assert_eq!(attributes["empty"], "<empty>");
}
