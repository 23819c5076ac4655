use crate::commands::{self, CommandSpec};

/// How a generated tree is launched. The entry point is a fixed relative
/// path inside the tree; the program resolves via PATH on the host.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSpec {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Generated bots are Node trees; every template shares the same runtime.
pub const NODE_RUNTIME: RuntimeSpec = RuntimeSpec {
    program: "node",
    args: &["index.js"],
};

#[derive(Debug, Clone, Copy)]
pub struct BotTemplate {
    pub template_id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub runtime: RuntimeSpec,
}

impl BotTemplate {
    /// The build-time command manifest: exactly the files the generator
    /// renders, one per command.
    pub fn commands(&self) -> &'static [CommandSpec] {
        commands::commands_for(self.template_id)
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands().iter().map(|c| c.name).collect()
    }
}

const TEMPLATES: &[BotTemplate] = &[
    BotTemplate {
        template_id: "moderation",
        display_name: "Moderation Bot",
        description: "A comprehensive moderation bot with kick, ban, mute, and warning commands",
        features: &["Kick/Ban/Mute", "Warning System", "Auto-moderation", "Logging"],
        runtime: NODE_RUNTIME,
    },
    BotTemplate {
        template_id: "fun",
        display_name: "Fun Bot",
        description: "Entertainment bot with games, memes, and interactive commands",
        features: &["Games", "Meme Commands", "Funny Responses", "Interactive Features"],
        runtime: NODE_RUNTIME,
    },
    BotTemplate {
        template_id: "modmail",
        display_name: "Modmail Bot",
        description: "Private messaging system between users and moderators",
        features: &["Private Messaging", "Ticket System", "Auto-responses", "Logging"],
        runtime: NODE_RUNTIME,
    },
    BotTemplate {
        template_id: "music",
        display_name: "Music Bot",
        description: "Music bot scaffold with queue commands (playback is a placeholder)",
        features: &["Music Playback", "Playlists", "Queue Management", "Audio Controls"],
        runtime: NODE_RUNTIME,
    },
    BotTemplate {
        template_id: "utility",
        display_name: "Utility Bot",
        description: "Useful tools and utilities for server management",
        features: &["Server Info", "User Info", "Role Management", "Custom Commands"],
        runtime: NODE_RUNTIME,
    },
];

pub fn list_templates() -> &'static [BotTemplate] {
    TEMPLATES
}

pub fn find_template(template_id: &str) -> Option<&'static BotTemplate> {
    TEMPLATES.iter().find(|t| t.template_id == template_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_templates_have_commands() {
        for t in list_templates() {
            assert!(
                !t.commands().is_empty(),
                "template {} declares no commands",
                t.template_id
            );
        }
    }

    #[test]
    fn find_known_template() {
        let t = find_template("fun").unwrap();
        assert_eq!(t.display_name, "Fun Bot");
        assert!(t.command_names().contains(&"8ball"));
    }

    #[test]
    fn find_unknown_template_is_none() {
        assert!(find_template("notatemplate").is_none());
    }

    #[test]
    fn template_ids_are_unique() {
        let mut ids: Vec<_> = list_templates().iter().map(|t| t.template_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), list_templates().len());
    }
}
