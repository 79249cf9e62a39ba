use mongodb::event::command::{
    CommandEventHandler, CommandFailedEvent, CommandStartedEvent, CommandSucceededEvent,
};
use tracing::{debug, error};

use atlas_interface::log_targets::DB_COMMAND;

// Forwards the driver's command monitoring events to the `mongodb::command`
// logger. The command body goes on its own line so the database log keeps
// one header per command.
pub struct CommandLogger;

impl CommandEventHandler for CommandLogger {
    fn handle_command_started_event(&self, event: CommandStartedEvent) {
        debug!(
            target: DB_COMMAND,
            "{} started on {}.{} (request {})\n{}",
            event.command_name,
            event.connection.address,
            event.db,
            event.request_id,
            event.command
        );
    }

    fn handle_command_succeeded_event(&self, event: CommandSucceededEvent) {
        debug!(
            target: DB_COMMAND,
            "{} succeeded in {:?} (request {})\n{}",
            event.command_name,
            event.duration,
            event.request_id,
            event.reply
        );
    }

    fn handle_command_failed_event(&self, event: CommandFailedEvent) {
        error!(
            target: DB_COMMAND,
            "{} failed after {:?} (request {})\n{}",
            event.command_name,
            event.duration,
            event.request_id,
            event.failure
        );
    }
}
