//! Property tests for the classifier, the platform filter and the path mirror

use autochd::Platform;
use autochd::services::{FormatBucket, PathMirror, accepts, classify};
use camino::{Utf8Path, Utf8PathBuf};
use proptest::prelude::*;

const KNOWN_EXTENSIONS: &[&str] = &[
    "cue", "gdi", "toc", "iso", "ccd", "mds", "nrg", "cdi", "cso", "pbp", "zip", "7z", "rar",
];

fn stem() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 _()-]{0,24}"
}

fn extension() -> impl Strategy<Value = &'static str> {
    prop::sample::select(KNOWN_EXTENSIONS)
}

fn platform() -> impl Strategy<Value = Platform> {
    prop::sample::select(Platform::ALL.to_vec())
}

fn relative_dir() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{1,8}", 0..4)
}

proptest! {
    #[test]
    fn classify_ignores_extension_case(stem in stem(), ext in extension()) {
        let lower = Utf8PathBuf::from(format!("{}.{}", stem, ext));
        let upper = Utf8PathBuf::from(format!("{}.{}", stem, ext.to_ascii_uppercase()));
        prop_assert!(classify(&lower).is_some());
        prop_assert_eq!(classify(&lower), classify(&upper));
    }

    #[test]
    fn unknown_extensions_are_ignored(stem in stem(), ext in "[a-z]{1,4}") {
        prop_assume!(!KNOWN_EXTENSIONS.contains(&ext.as_str()));
        let path = Utf8PathBuf::from(format!("{}.{}", stem, ext));
        prop_assert_eq!(classify(&path), None);
    }

    #[test]
    fn filter_accepts_only_owned_extensions(stem in stem(), ext in extension(), tag in platform()) {
        let path = Utf8PathBuf::from(format!("{}.{}", stem, ext));
        prop_assert!(accepts(&path, None));
        prop_assert_eq!(accepts(&path, Some(tag)), tag.extensions().contains(&ext));
    }

    #[test]
    fn every_image_extension_has_at_most_one_owner(ext in extension()) {
        let owners = Platform::ALL
            .iter()
            .filter(|p| accepts(Utf8Path::new(&format!("x.{}", ext)), Some(**p)))
            .count();
        prop_assert!(owners <= 1);
        if classify(Utf8Path::new(&format!("x.{}", ext))) == Some(FormatBucket::Archive) {
            prop_assert_eq!(owners, 0);
        }
    }

    #[test]
    fn mirror_preserves_relative_layout(parts in relative_dir(), title in stem()) {
        let source_root = Utf8PathBuf::from("/roms");
        let dest_root = Utf8PathBuf::from("/chd");

        let mut source_dir = source_root.clone();
        let mut expected_dir = dest_root.clone();
        for part in &parts {
            source_dir.push(part);
            expected_dir.push(part);
        }

        let mirror = PathMirror::new(source_root.clone(), Some(dest_root));
        prop_assert_eq!(mirror.destination_dir(&source_dir), expected_dir.clone());
        prop_assert_eq!(
            mirror.output_path(&source_dir, &title),
            expected_dir.join(format!("{}.chd", title))
        );

        let in_place = PathMirror::new(source_root, None);
        prop_assert_eq!(in_place.destination_dir(&source_dir), source_dir.clone());
    }
}
