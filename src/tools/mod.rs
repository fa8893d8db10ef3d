pub mod launcher_tool;
pub mod reaper_tool;
pub mod registry;
pub mod resource_tool;
pub mod template_tool;
pub mod terminal_tool;
