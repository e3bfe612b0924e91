use std::io;

use framelab_proto::Dispatcher;
use framelab_switch::{parse_interfaces, Switch};
use tracing::info;

use crate::cmd::SwitchArgs;
use crate::exit::{proto_error, spec_error, CliResult, SUCCESS};

pub fn run(args: SwitchArgs) -> CliResult<i32> {
    let interfaces =
        parse_interfaces(&args.interfaces).map_err(|err| spec_error("invalid interface", err))?;
    for spec in &interfaces {
        info!(index = spec.index, interface = %spec, "configured interface");
    }

    let mut switch = Switch::new(interfaces, io::stdout().lock())
        .map_err(|err| spec_error("invalid interface", err))?;
    let mut dispatcher = Dispatcher::new(io::stdin().lock(), switch.interface_count());
    dispatcher
        .run(&mut switch)
        .map_err(|err| proto_error("switch", err))?;

    info!(
        learned = switch.table().map_or(0, |table| table.len()),
        "input closed, switch exiting"
    );
    Ok(SUCCESS)
}
