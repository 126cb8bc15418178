use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use impersonatorfinder::config::AppConfig;
use serde::de::DeserializeOwned;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

pub fn load_json_fixture<T: DeserializeOwned>(relative: &str) -> T {
    let content = load_fixture(relative);
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse JSON fixture {}: {}", relative, e))
}

/// Configuration TOML pointing both API endpoints at `server_uri`.
pub fn test_config_toml(server_uri: &str, data_dir: &Path) -> String {
    format!(
        r#"
[api]
key = "test-key"
host = "directory.test"
user_info_url = "{uri}/user/info"
search_profiles_url = "{uri}/user/search"

[http]
user_agent = "impersonatorfinder-tests/1.0"
request_timeout_secs = 5

[thresholds]
avatar = 100.0
name = 90
bio = 90

[weights]
avatar = 1.0
name = 1.0
bio = 1.0

[analysis]
min_fake_score = 2.0
worker_count = 4
profile_url_base = "https://www.tiktok.com/@"

[output]
data_dir = '{data}'
save_json = false
"#,
        uri = server_uri,
        data = data_dir.display()
    )
}

pub fn test_config(server_uri: &str, data_dir: &Path) -> AppConfig {
    AppConfig::from_toml(&test_config_toml(server_uri, data_dir)).expect("test config should load")
}

/// A 16x16 flat grey PNG
pub fn avatar_png(value: u8) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(16, 16, Rgb([value, value, value])));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).expect("encode png");
    bytes.into_inner()
}
