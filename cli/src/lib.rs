mod usage;

pub use usage::UsageCommand;
pub use usage::render_json;
pub use usage::render_text;
