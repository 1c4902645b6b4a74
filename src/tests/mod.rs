mod manifest_cases;

#[cfg(test)]
mod tests {
    use crate::android::binary_xml::{render_as_xml_text, StringPool};
    use crate::tests::fixtures::{sample_manifest, sample_manifest_builder};

    #[test]
    fn sample_pool_lists_mapped_names_first() {
        let pool = StringPool::read(&sample_manifest(None)).unwrap();
        let strings: Vec<_> = pool.iter().take(5).collect();
        assert_eq!(
            strings,
            vec!["versionCode", "versionName", "minSdkVersion", "label", "name"]
        );
        assert!(pool.is_utf8());
    }

    #[test]
    fn utf8_and_utf16_pools_render_alike() {
        let utf8 = render_as_xml_text(&sample_manifest_builder(Some(true), true).build()).unwrap();
        let utf16 = render_as_xml_text(&sample_manifest_builder(Some(true), false).build()).unwrap();
        assert_eq!(utf8, utf16);
        println!("{utf8}");
    }
}
