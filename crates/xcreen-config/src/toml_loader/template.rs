//! Default config file content.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# xcreen configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[session]
# room_ttl_hours = 24    # 1-720, cached rooms older than this are discarded
# event_buffer = 256     # 16-4096
# base_url = ""          # e.g. "https://xcreen.example" for share links

[storage]
# backend = "file"       # file, memory
# directory = ""         # empty = platform data dir (xcreen/rooms)

[logging]
# level = "INFO"         # DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
