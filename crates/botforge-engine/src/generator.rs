use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use botforge_instance::InstanceId;

use crate::error::{Error, Result};
use crate::templates::{self, BotTemplate};

pub const MAX_PREFIX_LEN: usize = 3;

/// Parameters for one generation. The token is validated for presence only;
/// it is never rendered into the tree, echoed, or logged.
#[derive(Clone)]
pub struct GenerationRequest {
    pub template_id: String,
    pub bot_name: String,
    pub secret_token: String,
    pub command_prefix: String,
    pub selected_features: BTreeSet<String>,
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("template_id", &self.template_id)
            .field("bot_name", &self.bot_name)
            .field("secret_token", &"<redacted>")
            .field("command_prefix", &self.command_prefix)
            .field("selected_features", &self.selected_features)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub instance_id: InstanceId,
    pub template_id: String,
    pub tree_dir: PathBuf,
    pub archive_path: Option<PathBuf>,
}

fn validate(request: &GenerationRequest) -> Result<&'static BotTemplate> {
    let mut field_errors = BTreeMap::<String, String>::new();

    if request.bot_name.trim().is_empty() {
        field_errors.insert("bot_name".to_string(), "Required.".to_string());
    }
    if request.secret_token.trim().is_empty() {
        field_errors.insert("secret_token".to_string(), "Required.".to_string());
    }

    let prefix = request.command_prefix.trim();
    if prefix.is_empty() {
        field_errors.insert("command_prefix".to_string(), "Required.".to_string());
    } else if prefix.chars().count() > MAX_PREFIX_LEN {
        field_errors.insert(
            "command_prefix".to_string(),
            format!("Must be at most {MAX_PREFIX_LEN} characters."),
        );
    }

    let template = match request.template_id.trim() {
        "" => {
            field_errors.insert("template_id".to_string(), "Required.".to_string());
            None
        }
        id => {
            let found = templates::find_template(id);
            if found.is_none() {
                field_errors.insert("template_id".to_string(), format!("Unknown template: {id}"));
            }
            found
        }
    };

    if !field_errors.is_empty() {
        return Err(Error::invalid_request(field_errors));
    }

    // Unreachable fallback kept explicit: a missing template always produced
    // a field error above.
    template.ok_or_else(|| Error::invalid_field("template_id", "Unknown template."))
}

/// Render a complete source tree for `request` under `trees_root`.
///
/// The tree is staged under `.stage-<id>` and renamed into place only once
/// every file has been written, so a failed generation never leaves a
/// partially-written tree at an instance path.
pub fn generate(trees_root: &Path, request: &GenerationRequest) -> Result<GeneratedArtifact> {
    let template = validate(request)?;

    let instance_id = InstanceId::new();
    let stage_dir = trees_root.join(format!(".stage-{instance_id}"));
    let final_dir = trees_root.join(&instance_id.0);

    tracing::info!(
        instance_id = %instance_id,
        template_id = template.template_id,
        "generating bot tree"
    );

    let result = render_tree(&stage_dir, template, request);
    match result {
        Ok(()) => {
            fs::rename(&stage_dir, &final_dir).map_err(|e| {
                let _ = fs::remove_dir_all(&stage_dir);
                Error::GenerationFailed(e)
            })?;
            Ok(GeneratedArtifact {
                instance_id,
                template_id: template.template_id.to_string(),
                tree_dir: final_dir,
                archive_path: None,
            })
        }
        Err(e) => {
            let _ = fs::remove_dir_all(&stage_dir);
            Err(e)
        }
    }
}

fn render_tree(dir: &Path, template: &BotTemplate, request: &GenerationRequest) -> Result<()> {
    fs::create_dir_all(dir.join("commands")).map_err(Error::GenerationFailed)?;

    write_file(
        &dir.join("package.json"),
        &render_package_json(template, request)?,
    )?;
    write_file(&dir.join("index.js"), &render_index_js(template, request))?;
    for spec in template.commands() {
        write_file(
            &dir.join("commands").join(format!("{}.js", spec.name)),
            &spec.render_js(),
        )?;
    }
    write_file(&dir.join("config.json"), &render_config_json(request)?)?;
    write_file(&dir.join("README.md"), &render_readme(template, request))?;

    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    let mut f = fs::File::create(path).map_err(Error::GenerationFailed)?;
    f.write_all(contents.as_bytes())
        .map_err(Error::GenerationFailed)?;
    Ok(())
}

fn render_package_json(template: &BotTemplate, request: &GenerationRequest) -> Result<String> {
    let package_name = request
        .bot_name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    let manifest = serde_json::json!({
        "name": package_name,
        "version": "1.0.0",
        "description": format!("{} - {}", request.bot_name.trim(), template.description),
        "main": "index.js",
        "scripts": { "start": "node index.js" },
        "dependencies": {
            "discord.js": "^14.14.1",
            "dotenv": "^16.3.1",
        },
    });

    serde_json::to_string_pretty(&manifest)
        .map_err(|e| Error::GenerationFailed(std::io::Error::other(e)))
}

fn render_config_json(request: &GenerationRequest) -> Result<String> {
    let config = serde_json::json!({
        "botName": request.bot_name.trim(),
        "prefix": request.command_prefix.trim(),
        "embedColor": "#0099ff",
        "defaultCooldown": 3,
    });

    serde_json::to_string_pretty(&config)
        .map_err(|e| Error::GenerationFailed(std::io::Error::other(e)))
}

/// The entry point. Commands are wired through a static require table built
/// here at generation time; nothing is discovered by scanning directories at
/// the bot's own startup.
fn render_index_js(template: &BotTemplate, request: &GenerationRequest) -> String {
    let requires: Vec<String> = template
        .commands()
        .iter()
        .map(|c| format!("  require('./commands/{}.js')", c.name))
        .collect();

    format!(
        r#"const {{ Client, GatewayIntentBits, Collection }} = require('discord.js');
const config = require('./config.json');

const client = new Client({{
  intents: [
    GatewayIntentBits.Guilds,
    GatewayIntentBits.GuildMessages,
    GatewayIntentBits.MessageContent,
    GatewayIntentBits.GuildMembers
  ]
}});

client.prefix = process.env.PREFIX || config.prefix;
client.commands = new Collection();

// Command manifest, fixed at generation time.
const commandModules = [
{requires}
];
for (const command of commandModules) {{
  client.commands.set(command.name, command);
}}

client.once('ready', () => {{
  console.log(`${{client.user.tag}} is online!`);
  console.log(`Bot name: {bot_name}`);
  console.log(`Prefix: ${{client.prefix}}`);
}});

client.on('messageCreate', async message => {{
  if (!message.content.startsWith(client.prefix) || message.author.bot) return;

  const args = message.content.slice(client.prefix.length).trim().split(/ +/);
  const commandName = args.shift().toLowerCase();

  const command = client.commands.get(commandName) ||
                  client.commands.find(cmd => cmd.aliases && cmd.aliases.includes(commandName));

  if (!command) return;

  try {{
    await command.execute(message, args, client);
  }} catch (error) {{
    console.error(error);
    message.reply('There was an error executing that command!');
  }}
}});

client.on('error', error => {{
  console.error('Client error:', error);
}});

process.on('unhandledRejection', error => {{
  console.error('Unhandled promise rejection:', error);
}});

client.login(process.env.BOT_TOKEN);
"#,
        requires = requires.join(",\n"),
        bot_name = request.bot_name.trim(),
    )
}

fn render_readme(template: &BotTemplate, request: &GenerationRequest) -> String {
    let features = template
        .features
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n");
    let commands = template
        .commands()
        .iter()
        .map(|c| format!("- `{}{}` - {}", request.command_prefix.trim(), c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"# {name}

{description}

## Features
{features}

## Commands
{commands}

## Setup
1. Install dependencies: `npm install`
2. Export your bot token as `BOT_TOKEN` (never commit it)
3. Run the bot: `npm start`

## Environment Variables
- `BOT_TOKEN`: your bot token
- `PREFIX`: command prefix (defaults to the configured `{prefix}`)
"#,
        name = request.bot_name.trim(),
        description = template.description,
        features = features,
        commands = commands,
        prefix = request.command_prefix.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn request(template_id: &str) -> GenerationRequest {
        GenerationRequest {
            template_id: template_id.to_string(),
            bot_name: "Ace".to_string(),
            secret_token: "x".to_string(),
            command_prefix: "!".to_string(),
            selected_features: BTreeSet::new(),
        }
    }

    fn tree_file_names(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().unwrap().is_dir() {
                for sub in fs::read_dir(entry.path()).unwrap() {
                    let sub = sub.unwrap();
                    names.push(format!("{name}/{}", sub.file_name().to_string_lossy()));
                }
            } else {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    #[test]
    fn generate_renders_exactly_the_declared_file_set() {
        let root = tempfile::tempdir().unwrap();
        let artifact = generate(root.path(), &request("fun")).unwrap();

        let mut expected = vec![
            "package.json".to_string(),
            "index.js".to_string(),
            "config.json".to_string(),
            "README.md".to_string(),
        ];
        for spec in templates::find_template("fun").unwrap().commands() {
            expected.push(format!("commands/{}.js", spec.name));
        }
        expected.sort();

        assert_eq!(tree_file_names(&artifact.tree_dir), expected);
    }

    #[test]
    fn generated_index_requires_every_command_statically() {
        let root = tempfile::tempdir().unwrap();
        let artifact = generate(root.path(), &request("moderation")).unwrap();
        let index = fs::read_to_string(artifact.tree_dir.join("index.js")).unwrap();

        for spec in templates::find_template("moderation").unwrap().commands() {
            assert!(index.contains(&format!("require('./commands/{}.js')", spec.name)));
        }
        assert!(!index.contains("readdirSync"));
        assert!(index.contains("process.env.BOT_TOKEN"));
    }

    #[test]
    fn secret_token_never_lands_in_the_tree() {
        let root = tempfile::tempdir().unwrap();
        let mut req = request("utility");
        req.secret_token = "super-secret-token-value".to_string();
        let artifact = generate(root.path(), &req).unwrap();

        for name in tree_file_names(&artifact.tree_dir) {
            let contents = fs::read_to_string(artifact.tree_dir.join(&name)).unwrap();
            assert!(
                !contents.contains("super-secret-token-value"),
                "token leaked into {name}"
            );
        }
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let mut req = request("fun");
        req.secret_token = "super-secret".to_string();
        let dbg = format!("{req:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("super-secret"));
    }

    #[test]
    fn missing_fields_collect_per_field_errors() {
        let root = tempfile::tempdir().unwrap();
        let req = GenerationRequest {
            template_id: String::new(),
            bot_name: String::new(),
            secret_token: String::new(),
            command_prefix: "!!!!".to_string(),
            selected_features: BTreeSet::new(),
        };
        let err = generate(root.path(), &req).unwrap_err();
        let Error::InvalidRequest { field_errors } = err else {
            panic!("expected InvalidRequest");
        };
        assert!(field_errors.contains_key("template_id"));
        assert!(field_errors.contains_key("bot_name"));
        assert!(field_errors.contains_key("secret_token"));
        assert!(field_errors.contains_key("command_prefix"));
    }

    #[test]
    fn unknown_template_is_invalid_request() {
        let root = tempfile::tempdir().unwrap();
        let err = generate(root.path(), &request("notatemplate")).unwrap_err();
        let Error::InvalidRequest { field_errors } = err else {
            panic!("expected InvalidRequest");
        };
        assert!(field_errors["template_id"].contains("notatemplate"));
    }

    #[test]
    fn failed_validation_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let _ = generate(root.path(), &request("notatemplate"));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn concurrent_generations_stay_isolated() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().to_path_buf();

        let handles: Vec<_> = ["fun", "moderation"]
            .into_iter()
            .map(|template| {
                let path = path.clone();
                std::thread::spawn(move || generate(&path, &request(template)).unwrap())
            })
            .collect();
        let artifacts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_ne!(artifacts[0].tree_dir, artifacts[1].tree_dir);
        // Each tree contains only files attributable to its own template.
        let fun_files = tree_file_names(&artifacts[0].tree_dir);
        assert!(fun_files.contains(&"commands/8ball.js".to_string()));
        assert!(!fun_files.contains(&"commands/kick.js".to_string()));
        let moderation_files = tree_file_names(&artifacts[1].tree_dir);
        assert!(moderation_files.contains(&"commands/kick.js".to_string()));
        assert!(!moderation_files.contains(&"commands/8ball.js".to_string()));
    }

    #[test]
    fn config_echoes_name_prefix_and_defaults() {
        let root = tempfile::tempdir().unwrap();
        let artifact = generate(root.path(), &request("music")).unwrap();
        let raw = fs::read_to_string(artifact.tree_dir.join("config.json")).unwrap();
        let config: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(config["botName"], "Ace");
        assert_eq!(config["prefix"], "!");
        assert_eq!(config["defaultCooldown"], 3);
    }
}
