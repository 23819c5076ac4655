use rand::seq::SliceRandom;

/// Magic 8-ball answers, the classic twenty.
pub const EIGHTBALL_RESPONSES: &[&str] = &[
    "It is certain.",
    "It is decidedly so.",
    "Without a doubt.",
    "Yes - definitely.",
    "You may rely on it.",
    "As I see it, yes.",
    "Most likely.",
    "Outlook good.",
    "Yes.",
    "Signs point to yes.",
    "Reply hazy, try again.",
    "Ask again later.",
    "Better not tell you now.",
    "Cannot predict now.",
    "Concentrate and ask again.",
    "Don't count on it.",
    "My reply is no.",
    "My sources say no.",
    "Outlook not so good.",
    "Very doubtful.",
];

pub const MEMES: &[&str] = &[
    "Why did the programmer quit his job? Because he didn't get arrays!",
    "What do you call a computer that sings? A Dell!",
    "Why do programmers prefer dark mode? Because light attracts bugs!",
    "What's a programmer's favorite drink? Java!",
    "How many programmers does it take to change a light bulb? None, that's a hardware problem!",
];

pub const JOKES: &[&str] = &[
    "Why don't scientists trust atoms? Because they make up everything!",
    "What do you call a fake noodle? An impasta!",
    "Why did the scarecrow win an award? He was outstanding in his field!",
    "Why don't eggs tell jokes? They'd crack each other up!",
    "What do you call a bear with no teeth? A gummy bear!",
];

pub const COIN_SIDES: &[&str] = &["Heads", "Tails"];

/// How a command computes its reply. Pure function of the arguments plus,
/// for flavor commands, an injected randomness source.
#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Reply drawn uniformly from a fixed, enumerable response set.
    Pick {
        responses: &'static [&'static str],
        missing_args: Option<&'static str>,
    },
    /// Acts on a mentioned/named target; the rest of the arguments form a
    /// free-text reason.
    Targeted {
        missing_target: &'static str,
        /// Reply template with `{target}` and `{reason}` placeholders.
        reply: &'static str,
    },
    /// Canned reply, optionally requiring at least one argument
    /// (`{args}` is replaced by the joined argument text).
    Scripted {
        missing_args: Option<&'static str>,
        reply: &'static str,
    },
    Custom(fn(&[&str]) -> String),
}

/// A build-time command descriptor. The generator renders one source file
/// per spec, and the generated dispatcher resolves incoming names against
/// the same name/alias table.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub aliases: &'static [&'static str],
    behavior: Behavior,
}

impl CommandSpec {
    /// The fixed response set, for flavor commands.
    pub fn responses(&self) -> Option<&'static [&'static str]> {
        match self.behavior {
            Behavior::Pick { responses, .. } => Some(responses),
            _ => None,
        }
    }

    /// Compute the reply for `args`. Invalid arguments produce an error
    /// reply, never a failure: a malformed command must not take down the
    /// instance that runs it.
    pub fn execute<R: rand::Rng + ?Sized>(&self, args: &[&str], rng: &mut R) -> String {
        match self.behavior {
            Behavior::Pick {
                responses,
                missing_args,
            } => {
                if args.is_empty()
                    && let Some(msg) = missing_args
                {
                    return msg.to_string();
                }
                responses
                    .choose(rng)
                    .copied()
                    .unwrap_or_default()
                    .to_string()
            }
            Behavior::Targeted {
                missing_target,
                reply,
            } => {
                let Some((target, rest)) = args.split_first() else {
                    return missing_target.to_string();
                };
                let reason = if rest.is_empty() {
                    "No reason provided".to_string()
                } else {
                    rest.join(" ")
                };
                reply.replace("{target}", target).replace("{reason}", &reason)
            }
            Behavior::Scripted {
                missing_args,
                reply,
            } => {
                if args.is_empty()
                    && let Some(msg) = missing_args
                {
                    return msg.to_string();
                }
                reply.replace("{args}", &args.join(" "))
            }
            Behavior::Custom(f) => f(args),
        }
    }

    /// The generated per-command source file: a module exporting
    /// `{name, description, aliases, execute(message, args, client)}`.
    pub fn render_js(&self) -> String {
        let body = self.js_body();
        format!(
            "module.exports = {{\n  name: '{name}',\n  description: '{desc}',\n  aliases: {aliases},\n  async execute(message, args, client) {{\n{body}  }}\n}};\n",
            name = self.name,
            desc = self.description.replace('\'', "\\'"),
            aliases = js_string_array(self.aliases),
        )
    }

    fn js_body(&self) -> String {
        match self.behavior {
            Behavior::Pick {
                responses,
                missing_args,
            } => {
                let mut out = String::new();
                if let Some(msg) = missing_args {
                    out.push_str(&format!(
                        "    if (!args.length) {{\n      return message.reply('{}');\n    }}\n",
                        msg.replace('\'', "\\'")
                    ));
                }
                out.push_str(&format!(
                    "    const responses = {};\n    const response = responses[Math.floor(Math.random() * responses.length)];\n    message.reply(`**${{response}}**`);\n",
                    js_string_array(responses)
                ));
                out
            }
            _ => self.handwritten_js_body(),
        }
    }

    // Non-picker command bodies target the chat platform API directly and
    // are kept as literal blocks rather than derived from the behavior.
    fn handwritten_js_body(&self) -> String {
        let body = match self.name {
            "kick" => {
                "    if (!message.member.permissions.has('KickMembers')) {\n      return message.reply('You do not have permission to kick members!');\n    }\n    const user = message.mentions.users.first();\n    if (!user) {\n      return message.reply('Please mention a user to kick!');\n    }\n    const reason = args.slice(1).join(' ') || 'No reason provided';\n    try {\n      await message.guild.members.kick(user, reason);\n      message.reply(`Kicked ${user.tag}: ${reason}`);\n    } catch (error) {\n      message.reply('Failed to kick the user. Check my permissions!');\n    }\n"
            }
            "ban" => {
                "    if (!message.member.permissions.has('BanMembers')) {\n      return message.reply('You do not have permission to ban members!');\n    }\n    const user = message.mentions.users.first();\n    if (!user) {\n      return message.reply('Please mention a user to ban!');\n    }\n    const reason = args.slice(1).join(' ') || 'No reason provided';\n    try {\n      await message.guild.members.ban(user, { reason });\n      message.reply(`Banned ${user.tag}: ${reason}`);\n    } catch (error) {\n      message.reply('Failed to ban the user. Check my permissions!');\n    }\n"
            }
            "mute" => {
                "    if (!message.member.permissions.has('ModerateMembers')) {\n      return message.reply('You do not have permission to mute members!');\n    }\n    const user = message.mentions.users.first();\n    if (!user) {\n      return message.reply('Please mention a user to mute!');\n    }\n    const duration = parseInt(args[1]) || 5;\n    const reason = args.slice(2).join(' ') || 'No reason provided';\n    try {\n      const member = await message.guild.members.fetch(user.id);\n      await member.timeout(duration * 60 * 1000, reason);\n      message.reply(`Muted ${user.tag} for ${duration} minutes`);\n    } catch (error) {\n      message.reply('Failed to mute the user!');\n    }\n"
            }
            "warn" => {
                "    if (!message.member.permissions.has('ModerateMembers')) {\n      return message.reply('You do not have permission to warn members!');\n    }\n    const user = message.mentions.users.first();\n    if (!user) {\n      return message.reply('Please mention a user to warn!');\n    }\n    const reason = args.slice(1).join(' ') || 'No reason provided';\n    message.reply(`Warning issued to ${user.tag}. Reason: ${reason}`);\n"
            }
            "clear" => {
                "    if (!message.member.permissions.has('ManageMessages')) {\n      return message.reply('You do not have permission to delete messages!');\n    }\n    const amount = parseInt(args[0]) || 10;\n    if (amount < 1 || amount > 100) {\n      return message.reply('Please specify a number between 1 and 100!');\n    }\n    try {\n      await message.channel.bulkDelete(amount);\n      message.reply(`Deleted ${amount} messages!`);\n    } catch (error) {\n      message.reply('Failed to delete messages!');\n    }\n"
            }
            "ticket" => {
                "    const channel = await message.guild.channels.create({\n      name: `ticket-${message.author.username}`,\n      type: 0,\n      permissionOverwrites: [\n        { id: message.guild.id, deny: ['ViewChannel'] },\n        { id: message.author.id, allow: ['ViewChannel', 'SendMessages'] }\n      ]\n    });\n    message.reply(`Ticket created! Check ${channel}`);\n"
            }
            "close" => {
                "    if (!message.channel.name.startsWith('ticket-')) {\n      return message.reply('This command can only be used in ticket channels!');\n    }\n    message.reply('This ticket will be closed in 5 seconds...');\n    setTimeout(() => {\n      message.channel.delete();\n    }, 5000);\n"
            }
            "reply" => {
                "    if (!message.channel.name.startsWith('ticket-')) {\n      return message.reply('This command can only be used in ticket channels!');\n    }\n    const reply = args.join(' ');\n    if (!reply) {\n      return message.reply('Please provide a reply message!');\n    }\n    message.reply(`**Staff reply:** ${reply}`);\n"
            }
            "play" => {
                "    const song = args.join(' ');\n    if (!song) {\n      return message.reply('Please specify a song to play!');\n    }\n    message.reply(`**Now playing:** ${song}\\n*Placeholder: install a music library for real playback.*`);\n"
            }
            "skip" => {
                "    message.reply('**Skipped!**\\n*Placeholder: install a music library for real playback.*');\n"
            }
            "queue" => {
                "    message.reply('**Music queue:**\\n*Placeholder: install a music library for real playback.*');\n"
            }
            "ping" => {
                "    const reply = await message.reply('Pinging...');\n    const ping = reply.createdTimestamp - message.createdTimestamp;\n    reply.edit(`Pong! Latency: ${ping}ms | API latency: ${Math.round(client.ws.ping)}ms`);\n"
            }
            "serverinfo" => {
                "    const guild = message.guild;\n    message.reply([\n      `**${guild.name}**`,\n      `Owner: <@${guild.ownerId}>`,\n      `Members: ${guild.memberCount}`,\n      `Created: ${guild.createdAt.toDateString()}`,\n      `Roles: ${guild.roles.cache.size}`,\n      `Channels: ${guild.channels.cache.size}`\n    ].join('\\n'));\n"
            }
            "userinfo" => {
                "    const user = message.mentions.users.first() || message.author;\n    const member = message.guild.members.cache.get(user.id);\n    message.reply([\n      `**${user.tag}**`,\n      `ID: ${user.id}`,\n      `Created: ${user.createdAt.toDateString()}`,\n      `Joined: ${member ? member.joinedAt.toDateString() : 'unknown'}`,\n      `Roles: ${member ? member.roles.cache.size : 0}`\n    ].join('\\n'));\n"
            }
            other => unreachable!("no JS body registered for command {other}"),
        };
        body.to_string()
    }
}

fn js_string_array(items: &[&str]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|s| format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

const MODERATION_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "kick",
        description: "Kick a user from the server",
        aliases: &[],
        behavior: Behavior::Targeted {
            missing_target: "Please mention a user to kick!",
            reply: "Kicked {target}: {reason}",
        },
    },
    CommandSpec {
        name: "ban",
        description: "Ban a user from the server",
        aliases: &[],
        behavior: Behavior::Targeted {
            missing_target: "Please mention a user to ban!",
            reply: "Banned {target}: {reason}",
        },
    },
    CommandSpec {
        name: "mute",
        description: "Mute a user",
        aliases: &["timeout"],
        behavior: Behavior::Targeted {
            missing_target: "Please mention a user to mute!",
            reply: "Muted {target}: {reason}",
        },
    },
    CommandSpec {
        name: "warn",
        description: "Warn a user",
        aliases: &[],
        behavior: Behavior::Targeted {
            missing_target: "Please mention a user to warn!",
            reply: "Warning issued to {target}. Reason: {reason}",
        },
    },
    CommandSpec {
        name: "clear",
        description: "Clear messages from a channel",
        aliases: &["purge"],
        behavior: Behavior::Custom(clear_reply),
    },
];

const FUN_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "8ball",
        description: "Ask the magic 8-ball a question",
        aliases: &["eightball"],
        behavior: Behavior::Pick {
            responses: EIGHTBALL_RESPONSES,
            missing_args: Some("Please ask a question!"),
        },
    },
    CommandSpec {
        name: "meme",
        description: "Get a random meme",
        aliases: &[],
        behavior: Behavior::Pick {
            responses: MEMES,
            missing_args: None,
        },
    },
    CommandSpec {
        name: "joke",
        description: "Tell a random joke",
        aliases: &[],
        behavior: Behavior::Pick {
            responses: JOKES,
            missing_args: None,
        },
    },
    CommandSpec {
        name: "coinflip",
        description: "Flip a coin",
        aliases: &["flip", "coin"],
        behavior: Behavior::Pick {
            responses: COIN_SIDES,
            missing_args: None,
        },
    },
];

const MODMAIL_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "ticket",
        description: "Create a support ticket",
        aliases: &[],
        behavior: Behavior::Scripted {
            missing_args: None,
            reply: "Ticket created.",
        },
    },
    CommandSpec {
        name: "close",
        description: "Close a ticket",
        aliases: &[],
        behavior: Behavior::Scripted {
            missing_args: None,
            reply: "This ticket will be closed.",
        },
    },
    CommandSpec {
        name: "reply",
        description: "Reply to a ticket",
        aliases: &[],
        behavior: Behavior::Scripted {
            missing_args: Some("Please provide a reply message!"),
            reply: "Staff reply: {args}",
        },
    },
];

const MUSIC_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "play",
        description: "Play a song (placeholder)",
        aliases: &["p"],
        behavior: Behavior::Scripted {
            missing_args: Some("Please specify a song to play!"),
            reply: "Now playing: {args}",
        },
    },
    CommandSpec {
        name: "skip",
        description: "Skip the current song",
        aliases: &[],
        behavior: Behavior::Scripted {
            missing_args: None,
            reply: "Skipped!",
        },
    },
    CommandSpec {
        name: "queue",
        description: "Show the music queue",
        aliases: &["q"],
        behavior: Behavior::Scripted {
            missing_args: None,
            reply: "The music queue is empty.",
        },
    },
];

const UTILITY_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "ping",
        description: "Check bot latency",
        aliases: &[],
        behavior: Behavior::Scripted {
            missing_args: None,
            reply: "Pong!",
        },
    },
    CommandSpec {
        name: "serverinfo",
        description: "Display server information",
        aliases: &["server"],
        behavior: Behavior::Scripted {
            missing_args: None,
            reply: "Server information",
        },
    },
    CommandSpec {
        name: "userinfo",
        description: "Display user information",
        aliases: &["whois"],
        behavior: Behavior::Scripted {
            missing_args: None,
            reply: "User information",
        },
    },
];

fn clear_reply(args: &[&str]) -> String {
    let amount = args
        .first()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(10);
    if !(1..=100).contains(&amount) {
        return "Please specify a number between 1 and 100!".to_string();
    }
    format!("Deleted {amount} messages!")
}

pub fn commands_for(template_id: &str) -> &'static [CommandSpec] {
    match template_id {
        "moderation" => MODERATION_COMMANDS,
        "fun" => FUN_COMMANDS,
        "modmail" => MODMAIL_COMMANDS,
        "music" => MUSIC_COMMANDS,
        "utility" => UTILITY_COMMANDS,
        _ => &[],
    }
}

/// Name lookup with alias fallback, the same resolution order the generated
/// dispatcher uses.
pub fn find_command<'a>(specs: &'a [CommandSpec], token: &str) -> Option<&'a CommandSpec> {
    let token = token.to_ascii_lowercase();
    specs
        .iter()
        .find(|c| c.name == token)
        .or_else(|| specs.iter().find(|c| c.aliases.contains(&token.as_str())))
}
