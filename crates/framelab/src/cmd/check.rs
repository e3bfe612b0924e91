use framelab_switch::parse_interfaces;
use tracing::debug;

use crate::cmd::CheckArgs;
use crate::exit::{spec_error, CliResult, SUCCESS};
use crate::output::{print_interfaces, OutputFormat};

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let interfaces =
        parse_interfaces(&args.interfaces).map_err(|err| spec_error("invalid interface", err))?;
    debug!(count = interfaces.len(), "interface specifications valid");
    print_interfaces(&interfaces, format);
    Ok(SUCCESS)
}
