use mangle_core::{Ack, Engine, Error};
use mangle_wire::Command;

/// Applies a control command to the engine.
///
/// `add` and `del` yield a single acknowledgement, `show` one per listed object.
pub fn execute(engine: &mut Engine, command: &Command) -> Result<Vec<Ack>, Error> {
    let acks = match command {
        Command::FieldAdd { name, offset, len, mask } => vec![engine.add_field(name, *offset, *len, *mask)?],
        Command::FieldDel(name) => vec![engine.del_field(name)?],
        Command::FieldShow(name) => engine.show_fields(name.as_deref())?,
        Command::IfaceAdd(name) => vec![engine.add_iface(name)?],
        Command::IfaceDel(name) => vec![engine.del_iface(name)?],
        Command::IfaceShow(name) => engine.show_ifaces(name.as_deref())?,
        Command::RuleAdd { name, matches, writes } => vec![engine.add_rule(name, matches, writes)?],
        Command::RuleDel(name) => vec![engine.del_rule(name)?],
        Command::RuleShow(name) => engine.show_rules(name.as_deref())?,
        Command::ProcessAdd { input, routes } => vec![engine.add_process(input, routes)?],
        Command::ProcessDel(input) => vec![engine.del_process(input)?],
        Command::ProcessShow(input) => engine.show_processes(input.as_deref())?,
        Command::StateShow(name) => engine.show_states(name.as_deref())?,
    };

    Ok(acks)
}
