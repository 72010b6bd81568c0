//! ## [Messages](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/1042af37-aaa4-4edc-bffd-90a1ede24188)

use crate::ltp::{
    prop_context::{FileTime, PropertySet},
    prop_type::*,
    LtpResult,
};

/// `PidTagMessageClass` of ordinary mail.
pub const MESSAGE_CLASS_NOTE: &str = "IPM.Note";

/// The fields a message source provides for each message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub html_body: Option<String>,
}

impl MessageContent {
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
            body: body.into(),
            html_body: None,
        }
    }

    pub fn with_html_body(mut self, html_body: impl Into<String>) -> Self {
        self.html_body = Some(html_body.into());
        self
    }

    /// Property set stored for this message. A sender that looks like an address is also
    /// recorded as `PidTagSenderEmailAddress`.
    pub fn properties(&self, time: FileTime) -> LtpResult<PropertySet> {
        let mut properties = PropertySet::new();
        properties.insert(PR_MESSAGE_CLASS, MESSAGE_CLASS_NOTE)?;
        properties.insert(PR_SUBJECT, self.subject.as_str())?;
        properties.insert(PR_SENDER_NAME, self.sender.as_str())?;
        if self.sender.contains('@') {
            properties.insert(PR_SENDER_EMAIL_ADDRESS, self.sender.as_str())?;
        }
        properties.insert(PR_CREATION_TIME, time)?;
        properties.insert(PR_LAST_MODIFICATION_TIME, time)?;
        properties.insert(PR_BODY, self.body.as_str())?;
        properties.insert(
            PR_MESSAGE_SIZE,
            u32::try_from(self.body.len()).unwrap_or(u32::MAX),
        )?;
        if let Some(html_body) = self.html_body.as_deref() {
            properties.insert(PR_BODY_HTML, html_body)?;
        }
        Ok(properties)
    }

    /// Recover the content fields from a stored message.
    pub fn from_properties(properties: &PropertySet) -> Self {
        let text = |tag| properties.unicode(tag).unwrap_or_default().to_string();
        Self {
            subject: text(PR_SUBJECT),
            sender: text(PR_SENDER_NAME),
            body: text(PR_BODY),
            html_body: properties.unicode(PR_BODY_HTML).map(str::to_string),
        }
    }
}

/// A finite sequence of messages to store, such as records recovered by a content scanner.
pub trait MessageSource {
    fn next_message(&mut self) -> Option<MessageContent>;
}

impl<I> MessageSource for I
where
    I: Iterator<Item = MessageContent>,
{
    fn next_message(&mut self) -> Option<MessageContent> {
        self.next()
    }
}
