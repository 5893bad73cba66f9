//! Conversation-related types.

use std::collections::HashSet;

use github_agent_model::{
    AssistantMessage, ModelMessage, ToolCallRequest, ToolCallResult,
};

/// Represents a conversation.
///
/// Items are only ever appended. The system instruction is not part of the
/// conversation, the agent prepends it when building model requests.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    pub(crate) items: Vec<Item>,
}

impl Conversation {
    /// Returns all items in insertion order.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns an iterator over the messages in insertion order.
    #[inline]
    pub fn messages(&self) -> impl Iterator<Item = &ModelMessage> {
        self.items.iter().map(|item| &item.msg)
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been said yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the most recent assistant message.
    pub fn last_assistant(&self) -> Option<&AssistantMessage> {
        self.items.iter().rev().find_map(|item| match &item.msg {
            ModelMessage::Assistant(msg) => Some(msg),
            _ => None,
        })
    }

    /// Returns the ids of tool call requests that have no result yet.
    ///
    /// This is empty whenever the agent is between turns.
    pub fn unanswered_tool_calls(&self) -> Vec<&str> {
        let answered: HashSet<&str> = self
            .messages()
            .filter_map(|msg| match msg {
                ModelMessage::Tool(result) => Some(result.id.as_str()),
                _ => None,
            })
            .collect();
        self.messages()
            .filter_map(|msg| match msg {
                ModelMessage::Assistant(msg) => Some(&msg.tool_calls),
                _ => None,
            })
            .flatten()
            .map(|call| call.id.as_str())
            .filter(|id| !answered.contains(id))
            .collect()
    }

    pub(crate) fn push_user(&mut self, input: String) -> &Item {
        self.push(Item {
            transcript: input.clone(),
            msg: ModelMessage::User(input),
        })
    }

    pub(crate) fn push_assistant(&mut self, msg: AssistantMessage) -> &Item {
        let mut transcript = msg.content.clone();
        for call in &msg.tool_calls {
            if !transcript.is_empty() {
                transcript.push('\n');
            }
            transcript.push_str(&describe_call(call));
        }
        self.push(Item {
            msg: ModelMessage::Assistant(msg),
            transcript,
        })
    }

    pub(crate) fn push_tool_result(&mut self, result: ToolCallResult) -> &Item {
        self.push(Item {
            transcript: result.content.clone(),
            msg: ModelMessage::Tool(result),
        })
    }

    fn push(&mut self, item: Item) -> &Item {
        self.items.push(item);
        &self.items[self.items.len() - 1]
    }
}

/// An item in the conversation.
#[derive(Clone, Debug)]
pub struct Item {
    pub(crate) msg: ModelMessage,
    pub(crate) transcript: String,
}

impl Item {
    /// Returns the message of this item.
    #[inline]
    pub fn message(&self) -> &ModelMessage {
        &self.msg
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is a string representation of the message item,
    /// which can be exported later. But transcript alone is not enough
    /// to reconstruct the message item.
    #[inline]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

fn describe_call(call: &ToolCallRequest) -> String {
    format!("[tool call: {}({})]", call.name, call.arguments)
}
