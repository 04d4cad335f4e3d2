//! Outbound request frames.

/// A request this client can send to the server. `encode` produces the
/// exact bytes to write to the socket, `Name:`/`Version:`/etc. header lines
/// terminated `\n`, a blank line never required.
#[derive(Debug, Clone)]
pub enum OutboundCommand {
    Create { name: String, password: String },
    Join { name: String, password: String },
    Change { name: String, version: String, cell: String, content: String },
    Undo { name: String, version: String },
    Save { name: String },
    Leave { name: String },
}

impl OutboundCommand {
    pub fn encode(&self) -> String {
        match self {
            OutboundCommand::Create { name, password } => {
                format!("CREATE\nName:{name}\nPassword:{password}\n")
            }
            OutboundCommand::Join { name, password } => {
                format!("JOIN\nName:{name}\nPassword:{password}\n")
            }
            OutboundCommand::Change { name, version, cell, content } => {
                format!(
                    "CHANGE\nName:{name}\nVersion:{version}\nCell:{cell}\nLength:{}\n{content}\n",
                    content.len()
                )
            }
            OutboundCommand::Undo { name, version } => {
                format!("UNDO\nName:{name}\nVersion:{version}\n")
            }
            OutboundCommand::Save { name } => format!("SAVE\nName:{name}\n"),
            OutboundCommand::Leave { name } => format!("LEAVE\nName:{name}\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_frame_carries_a_correct_length_header() {
        let cmd = OutboundCommand::Change {
            name: "sheet".into(),
            version: "7".into(),
            cell: "A1".into(),
            content: "=B1+1".into(),
        };
        let encoded = cmd.encode();
        assert!(encoded.contains("Length:5\n"));
        assert!(encoded.ends_with("=B1+1\n"));
    }

    #[test]
    fn create_frame_matches_the_wire_format() {
        let cmd = OutboundCommand::Create { name: "sheet".into(), password: "pw".into() };
        assert_eq!(cmd.encode(), "CREATE\nName:sheet\nPassword:pw\n");
    }
}
