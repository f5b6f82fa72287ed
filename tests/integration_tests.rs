use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn runs_without_arguments() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.assert().success();
}

#[test]
fn runs_hello_world() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run")
        .arg("tests/files/hello.asm")
        .arg("--device")
        .arg("console");

    cmd.assert()
        .success()
        .stdout(contains("Hello, world!\n"))
        .stdout(contains("Halted"));
}

#[test]
fn runs_file_without_subcommand() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("tests/files/hello.asm");
    cmd.assert().success().stdout(contains("Hello, world!"));
}

#[test]
fn reports_final_registers() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run").arg("tests/files/calls.asm");
    cmd.assert()
        .success()
        .stdout(contains("cpu0.0: A=00 B=0f"))
        .stdout(contains("SP=efff"));
}

#[test]
fn checks_valid_file() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("check").arg("tests/files/hello.asm");
    cmd.assert().success().stdout(contains("no errors found"));
}

#[test]
fn collects_every_assembler_error() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("check").arg("tests/files/errors.asm");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown instruction `FROB`"))
        .stderr(contains("Undefined label `nowhere`"))
        .stderr(contains("Value 300 does not fit in 8 bits"))
        .stderr(contains("due to 3 previous errors"));
}

#[test]
fn compiled_binary_runs() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("hello.bin");

    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("compile").arg("tests/files/hello.asm").arg(&bin);
    cmd.assert().success().stdout(contains("Saved"));

    let image = std::fs::read(&bin).unwrap();
    // LEA C, D, msg
    assert_eq!(image[..3], [0x15u8, 0x02, 0x03]);
    assert!(image.ends_with(b"Hello, world!\n\0"));

    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run").arg(&bin).arg("-d").arg("console").arg("--minimal");
    cmd.assert().success().stdout(contains("Hello, world!"));
}

#[test]
fn disassembles_source() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("disasm").arg("tests/files/calls.asm");
    cmd.assert()
        .success()
        .stdout(contains("0000:  11 00 05"))
        .stdout(contains("CALL"))
        .stdout(contains("MOV        [0x1000], B"));
}

#[test]
fn stops_at_cycle_limit() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run").arg("tests/files/spin.asm").arg("--cycles").arg("50");
    cmd.assert()
        .success()
        .stdout(contains("cycle limit of 50 reached"));

    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.env("WEFT_CYCLE_LIMIT", "20")
        .arg("run")
        .arg("tests/files/spin.asm");
    cmd.assert()
        .success()
        .stdout(contains("cycle limit of 20 reached"));
}

#[test]
fn pauses_at_breakpoints() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run")
        .arg("tests/files/calls.asm")
        .arg("--break")
        .arg("again")
        .arg("--minimal");
    cmd.assert()
        .success()
        .stdout(contains("Breakpoint").count(5))
        .stdout(contains("0x0006 (again)"))
        .stdout(contains("Halted"));

    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run")
        .arg("tests/files/calls.asm")
        .arg("--break")
        .arg("nowhere")
        .arg("--minimal");
    cmd.assert()
        .failure()
        .stderr(contains("Breakpoint `nowhere` is neither a number nor a label"));

    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run")
        .arg("tests/files/calls.asm")
        .arg("--break")
        .arg("0x0006")
        .arg("--minimal");
    cmd.assert()
        .success()
        .stdout(contains("Breakpoint").count(5))
        .stdout(contains("0x0006"))
        .stdout(contains("Halted"));
}

#[test]
fn rom_write_is_fatal() {
    let mut cmd = Command::cargo_bin("weft").unwrap();
    cmd.arg("run").arg("tests/files/rom_write.asm");
    cmd.assert()
        .failure()
        .stderr(contains("Write to read-only memory at 0x0010"));
}
