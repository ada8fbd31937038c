use std::process::ExitCode;

use pmm_connect::ConnectionKind;

fn main() -> ExitCode {
    pmm_connect::cli::main(ConnectionKind::Ssh)
}
