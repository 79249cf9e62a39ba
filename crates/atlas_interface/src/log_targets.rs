// Named loggers shared by the code emitting records and the logging setup
// routing them. Children use the `::` separator (e.g. `api::users`).

// Web-serving layer.
pub const API: &str = "api";

// Commands sent to the document database.
pub const DB_COMMAND: &str = "mongodb::command";
