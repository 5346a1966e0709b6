#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use assert_cmd::Command;

const FAKE_GLSLANG: &str = r#"#!/bin/sh
out=""
while [ "$#" -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
printf '\003\002\043\007\000\003\001\000' > "$out"
"#;

#[test]
fn writes_spirv_for_both_stages() {
    let dir = tempfile::tempdir().unwrap();
    let glslang = dir.path().join("glslangValidator");
    std::fs::write(&glslang, FAKE_GLSLANG).unwrap();
    std::fs::set_permissions(&glslang, std::fs::Permissions::from_mode(0o755)).unwrap();

    let input = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../lumen-shader/tests/fixtures/shader.cfg");
    let vert = dir.path().join("shader.vert.spv");
    let frag = dir.path().join("shader.frag.spv");

    Command::cargo_bin("lumen-shaderc")
        .unwrap()
        .current_dir(dir.path())
        .arg(&input)
        .arg("--glslang")
        .arg(&glslang)
        .arg("--spirv-vert")
        .arg(&vert)
        .arg("--spirv-frag")
        .arg(&frag)
        .assert()
        .success();

    let expected = [0x03, 0x02, 0x23, 0x07, 0x00, 0x03, 0x01, 0x00];
    assert_eq!(std::fs::read(&vert).unwrap(), expected);
    assert_eq!(std::fs::read(&frag).unwrap(), expected);
}
