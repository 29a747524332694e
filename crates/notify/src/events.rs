//! Icinga notification model and its markdown rendering.

use std::fmt;
use std::str::FromStr;

use crate::error::StateError;

const WARN_ICON: &str = "⚠";
const ERROR_ICON: &str = "❌";
const OK_ICON: &str = "✅";
const QUESTION_ICON: &str = "❓";
const HOST_ICON: &str = "🖥️";
const SERVICE_ICON: &str = "⚙️";

/// Host or service state as Icinga reports it in notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Host states
    Up,
    Down,
    /// Service states
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl State {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    #[must_use]
    pub const fn icon(&self) -> &'static str {
        match self {
            Self::Up | Self::Ok => OK_ICON,
            Self::Down | Self::Critical => ERROR_ICON,
            Self::Warning => WARN_ICON,
            Self::Unknown => QUESTION_ICON,
        }
    }

    /// Font color used for the state word.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Up | Self::Ok => "#44bb77",
            Self::Down | Self::Critical => "#ff5566",
            Self::Warning => "#ffaa44",
            Self::Unknown => "#aa44ff",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Self::Up),
            "DOWN" => Ok(Self::Down),
            "OK" => Ok(Self::Ok),
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(StateError(other.to_string())),
        }
    }
}

/// Wrap multi-line text in a preformatted block; single lines pass through.
#[must_use]
pub fn newline_to_formatted_html(text: &str) -> String {
    if text.contains('\n') {
        format!("<br><pre>{text}</pre>")
    } else {
        text.to_string()
    }
}

/// A service the notification is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
    pub name: String,
    pub display_name: String,
}

/// One Icinga host or service notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcingaNotification {
    pub host_name: String,
    pub host_display_name: String,
    /// `None` for host notifications
    pub service: Option<ServiceRef>,
    pub state: State,
    /// Icinga's long date/time string, shown verbatim
    pub date: String,
    pub output: String,
    pub address: Option<String>,
    pub author: Option<String>,
    pub comment: Option<String>,
    /// Icinga Web base URL for the quick link
    pub web_url: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl IcingaNotification {
    /// Link to the host or service page in Icinga Web.
    ///
    /// Service links escape spaces as `%20`, host links as `+`, matching
    /// what Icinga Web itself generates.
    #[must_use]
    pub fn quick_link(&self) -> Option<String> {
        let base = non_empty(self.web_url.as_ref())?.trim_matches('/');
        match &self.service {
            Some(service) => Some(format!(
                "{base}/icingadb/service?name={}&host.name={}",
                service.name.replace(' ', "%20"),
                self.host_name.replace(' ', "%20")
            )),
            None if !self.host_name.is_empty() => Some(format!(
                "{base}/icingadb/host?name={}",
                self.host_name.replace(' ', "+")
            )),
            None => None,
        }
    }

    /// Markdown body of the chat message (with a little inline HTML).
    #[must_use]
    pub fn build_message(&self) -> String {
        let (item, kind_icon) = match &self.service {
            Some(service) => (
                format!(
                    "**{}** on **{}**",
                    service.display_name, self.host_display_name
                ),
                SERVICE_ICON,
            ),
            None => (format!("**{}**", self.host_display_name), HOST_ICON),
        };
        let icon = format!("{}&nbsp;&nbsp;{kind_icon}", self.state.icon());

        let address = non_empty(self.address.as_ref())
            .map(|ip| format!("<br>**IP:** {ip}"))
            .unwrap_or_default();
        let comment = match (
            non_empty(self.comment.as_ref()),
            non_empty(self.author.as_ref()),
        ) {
            (Some(comment), Some(author)) => format!(
                "<br>**Comment by {author}:** {}",
                newline_to_formatted_html(comment)
            ),
            _ => String::new(),
        };
        let link = self
            .quick_link()
            .map(|url| format!("<br>[Quick Link]({url})"))
            .unwrap_or_default();

        format!(
            "{icon}&nbsp;&nbsp;&nbsp;{item} is **<font color=\"{color}\">{state}</font>** <br>\n\
             **When:** {date}. <br>\n\
             **Info:** {output}{address}{comment}{link}",
            color = self.state.color(),
            state = self.state,
            date = self.date,
            output = newline_to_formatted_html(&self.output),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_notification() -> IcingaNotification {
        IcingaNotification {
            host_name: "matrix host".into(),
            host_display_name: "Matrix".into(),
            service: Some(ServiceRef {
                name: "synapse federation".into(),
                display_name: "Federation".into(),
            }),
            state: State::Critical,
            date: "2024-03-01 12:00:00 +0000".into(),
            output: "CRITICAL: timeout".into(),
            address: None,
            author: None,
            comment: None,
            web_url: None,
        }
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!("WARNING".parse::<State>().unwrap(), State::Warning);
        assert_eq!("UP".parse::<State>().unwrap(), State::Up);
        let err = "PENDING".parse::<State>().unwrap_err();
        assert_eq!(err.to_string(), "no icon or color for state PENDING");
    }

    #[test]
    fn test_icons_and_colors() {
        assert_eq!(State::Up.icon(), "✅");
        assert_eq!(State::Down.color(), "#ff5566");
        assert_eq!(State::Warning.color(), "#ffaa44");
        assert_eq!(State::Unknown.icon(), "❓");
        assert_eq!(State::Unknown.color(), "#aa44ff");
    }

    #[test]
    fn test_newline_to_formatted_html() {
        assert_eq!(newline_to_formatted_html("one line"), "one line");
        assert_eq!(newline_to_formatted_html("a\nb"), "<br><pre>a\nb</pre>");
    }

    #[test]
    fn test_service_message() {
        let msg = service_notification().build_message();
        assert_eq!(
            msg,
            "❌&nbsp;&nbsp;⚙️&nbsp;&nbsp;&nbsp;**Federation** on **Matrix** is \
             **<font color=\"#ff5566\">CRITICAL</font>** <br>\n\
             **When:** 2024-03-01 12:00:00 +0000. <br>\n\
             **Info:** CRITICAL: timeout"
        );
    }

    #[test]
    fn test_host_message_with_extras() {
        let notification = IcingaNotification {
            service: None,
            state: State::Down,
            address: Some("10.0.0.1".into()),
            author: Some("alice".into()),
            comment: Some("looking\ninto it".into()),
            web_url: Some("https://icinga.example.org/".into()),
            ..service_notification()
        };
        let msg = notification.build_message();
        assert!(msg.starts_with("❌&nbsp;&nbsp;🖥️&nbsp;&nbsp;&nbsp;**Matrix** is"));
        assert!(msg.contains("<br>**IP:** 10.0.0.1"));
        assert!(msg.contains("<br>**Comment by alice:** <br><pre>looking\ninto it</pre>"));
        assert!(msg.ends_with(
            "<br>[Quick Link](https://icinga.example.org/icingadb/host?name=matrix+host)"
        ));
    }

    #[test]
    fn test_comment_needs_author() {
        let notification = IcingaNotification {
            comment: Some("orphan".into()),
            ..service_notification()
        };
        assert!(!notification.build_message().contains("Comment"));
    }

    #[test]
    fn test_service_quick_link_escapes_spaces() {
        let notification = IcingaNotification {
            web_url: Some("https://icinga.example.org".into()),
            ..service_notification()
        };
        assert_eq!(
            notification.quick_link().as_deref(),
            Some(
                "https://icinga.example.org/icingadb/service?name=synapse%20federation&host.name=matrix%20host"
            )
        );
    }
}
