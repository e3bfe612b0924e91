use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framelab {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framelab");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("FRAMELAB_BUILD_TARGET"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("max_interfaces: {}", framelab_proto::MAX_INTERFACES);
    println!("learning_table: {} entries", framelab_switch::TABLE_CAPACITY);
    println!("raw_links: {}", cfg!(target_os = "linux"));

    Ok(SUCCESS)
}
