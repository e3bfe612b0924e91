use std::io;

use framelab_proto::Dispatcher;
use framelab_switch::Hub;
use tracing::info;

use crate::cmd::HubArgs;
use crate::exit::{proto_error, spec_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: HubArgs) -> CliResult<i32> {
    if let Some(pos) = args.interfaces.iter().position(String::is_empty) {
        return Err(CliError::new(
            USAGE,
            format!("invalid interface: interface {}: empty interface name", pos + 1),
        ));
    }
    let mut hub = Hub::new(args.interfaces.len(), io::stdout().lock())
        .map_err(|err| spec_error("invalid interface", err))?;
    for (i, name) in args.interfaces.iter().enumerate() {
        info!(index = i + 1, interface = %name, "configured interface");
    }

    let mut dispatcher = Dispatcher::new(io::stdin().lock(), hub.interface_count());
    dispatcher
        .run(&mut hub)
        .map_err(|err| proto_error("hub", err))?;

    info!("input closed, hub exiting");
    Ok(SUCCESS)
}
