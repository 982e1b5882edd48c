use super::*;
use std::fs;
use tempfile::TempDir;

fn all_rules() -> PreprocessingConfig {
    PreprocessingConfig {
        remove_headers_footers: true,
        remove_page_numbers: true,
    }
}

#[test]
fn discovery_is_recursive_sorted_and_case_insensitive() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("nested/deeper")).expect("should create dirs");

    for name in ["b.pdf", "a.PDF", "notes.txt", "nested/c.pdf", "nested/deeper/d.Pdf"] {
        fs::write(root.join(name), b"%PDF-1.5").expect("should write file");
    }

    let found: Vec<String> = discover_pdfs(root)
        .iter()
        .map(|p| {
            p.strip_prefix(root)
                .expect("under root")
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();

    assert_eq!(found, vec!["a.PDF", "b.pdf", "nested/c.pdf", "nested/deeper/d.Pdf"]);
}

#[test]
fn discovery_of_missing_directory_is_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    assert!(discover_pdfs(&temp_dir.path().join("does-not-exist")).is_empty());
}

#[test]
fn filename_year_and_title() {
    assert_eq!(
        metadata_from_filename("attention_is_all_you_need_2017.pdf"),
        (
            "attention is all you need".to_string(),
            Some("2017".to_string())
        )
    );
    assert_eq!(
        metadata_from_filename("1998-gradient-based-learning.pdf"),
        (
            "gradient based learning".to_string(),
            Some("1998".to_string())
        )
    );
    assert_eq!(
        metadata_from_filename("protein folding.pdf"),
        ("protein folding".to_string(), None)
    );
}

#[test]
fn filename_ignores_non_year_numbers() {
    // Five digits and 18xx are not years
    assert_eq!(
        metadata_from_filename("dataset_12345_1850.pdf"),
        ("dataset 12345 1850".to_string(), None)
    );
}

#[test]
fn filename_that_is_only_a_year_keeps_stem() {
    assert_eq!(
        metadata_from_filename("2021.pdf"),
        ("2021".to_string(), Some("2021".to_string()))
    );
}

#[test]
fn source_metadata_reads_filesystem() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("graph_networks_2020.pdf");
    fs::write(&path, vec![0_u8; 321]).expect("should write file");

    let metadata = source_metadata(&path).expect("should read metadata");
    assert_eq!(metadata.filename, "graph_networks_2020.pdf");
    assert_eq!(metadata.title, "graph networks");
    assert_eq!(metadata.year.as_deref(), Some("2020"));
    assert_eq!(metadata.file_size, 321);
    assert_eq!(metadata.file_path, path.display().to_string());

    assert!(source_metadata(&temp_dir.path().join("missing.pdf")).is_err());
}

#[test]
fn preprocessing_drops_page_numbers_and_headers() {
    let raw = "JOURNAL OF MACHINE LEARNING RESEARCH\nIntroduction to the method.\n12\nPage 3 of 10\nMore text here.";
    let cleaned = preprocess_text(raw, &all_rules());
    assert_eq!(cleaned, "Introduction to the method. More text here.");
}

#[test]
fn preprocessing_rules_can_be_disabled() {
    let raw = "JOURNAL OF MACHINE LEARNING RESEARCH\nBody.\n12";
    let config = PreprocessingConfig {
        remove_headers_footers: false,
        remove_page_numbers: false,
    };
    assert_eq!(
        preprocess_text(raw, &config),
        "JOURNAL OF MACHINE LEARNING RESEARCH Body. 12"
    );
}

#[test]
fn preprocessing_keeps_numbers_inside_sentences() {
    let raw = "We trained 12 models\nfor 300 epochs.";
    assert_eq!(
        preprocess_text(raw, &all_rules()),
        "We trained 12 models for 300 epochs."
    );
}

#[test]
fn preprocessing_strips_urls_and_emails() {
    let raw = "Code at https://github.com/org/repo and www.example.org, contact jane.doe@uni.edu for data.";
    assert_eq!(
        preprocess_text(raw, &all_rules()),
        "Code at and contact for data."
    );
}

#[test]
fn preprocessing_collapses_punctuation_runs() {
    let raw = "Contents.......... 4\nSection -------- end";
    assert_eq!(
        preprocess_text(raw, &all_rules()),
        "Contents... 4 Section --- end"
    );
}

#[test]
fn preprocessing_collapses_whitespace() {
    assert_eq!(
        preprocess_text("  a\t\tb \n\n c  ", &all_rules()),
        "a b c"
    );
    assert_eq!(preprocess_text("   \n\t", &all_rules()), "");
}
