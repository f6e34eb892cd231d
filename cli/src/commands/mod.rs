pub mod compile;
pub mod decode;
pub mod plate;

use std::path::{Path, PathBuf};

/// `path` with `.extension` appended, keeping any dots already in the file name.
pub fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_extension_keeps_dots() {
        assert_eq!(append_extension(Path::new("out/foo.v1"), "bitmap"), PathBuf::from("out/foo.v1.bitmap"));
        assert_eq!(append_extension(Path::new("a.plate"), "json"), PathBuf::from("a.plate.json"));
    }
}
