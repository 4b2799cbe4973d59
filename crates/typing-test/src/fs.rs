/// Writes `<table>.csv` files into a fresh temporary directory, removed
/// when the returned handle is dropped.
pub fn create_config_dir(tables: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("Failed to create config dir");

    for (table, content) in tables {
        std::fs::write(dir.path().join(format!("{}.csv", table)), content).expect("Failed to write config table");
    }

    dir
}
