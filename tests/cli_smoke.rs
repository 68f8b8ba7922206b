use std::process::Command;

#[test]
fn help_displays_overview() {
    let binary = env!("CARGO_BIN_EXE_rust-stock-feed");
    let output = Command::new(binary)
        .arg("--help")
        .output()
        .expect("invoke rust-stock-feed --help");

    assert!(output.status.success(), "help command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Stock quote polling and broadcast server"),
        "expected overview text in help output"
    );
    for subcommand in ["serve", "tail", "chart"] {
        assert!(stdout.contains(subcommand), "missing {subcommand} in help");
    }
}

#[test]
fn tail_requires_symbols() {
    let binary = env!("CARGO_BIN_EXE_rust-stock-feed");
    let output = Command::new(binary)
        .arg("tail")
        .output()
        .expect("invoke rust-stock-feed tail");

    assert!(!output.status.success(), "tail without --symbols should fail");
}
