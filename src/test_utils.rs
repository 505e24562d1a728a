use std::io::Write;
use std::net::IpAddr;

use tempfile::NamedTempFile;

pub fn addr(input: &str) -> IpAddr {
    input.parse().expect(input)
}

pub fn file_with(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file creation to succeed");
    file.write_all(content.as_bytes())
        .expect("writing temp file to succeed");
    file
}
