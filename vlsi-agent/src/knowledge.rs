//! Knowledge-graph element extraction
//!
//! A chat model is asked to list the entities and relations in a piece of
//! text using `Node(...)` / `Relationship(...)` lines, which are parsed back
//! into typed elements.

use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use vlsi_core::{ChatError, ChatMessage, ChatModel};

use crate::prompts::KG_EXTRACTION_PROMPT;

const NODE_PATTERN: &str = r#"Node\(id=['"](.*?)['"],\s*type=['"](.*?)['"]\)"#;
const RELATIONSHIP_PATTERN: &str = r#"Relationship\(subj=Node\(id=['"](.*?)['"],\s*type=['"](.*?)['"]\),\s*obj=Node\(id=['"](.*?)['"],\s*type=['"](.*?)['"]\),\s*type=['"](.*?)['"]\)"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub node_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphRelationship {
    pub subj: GraphNode,
    pub obj: GraphNode,
    pub rel_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphElement {
    /// Unique by id, in order of first mention.
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

impl GraphElement {
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    fn add_node(&mut self, node: GraphNode) {
        if !self.nodes.iter().any(|n| n.id == node.id) {
            self.nodes.push(node);
        }
    }
}

/// Parses `Node(...)` and `Relationship(...)` lines. Nodes mentioned only
/// inside a relationship are included as well.
pub fn parse_graph_elements(text: &str) -> GraphElement {
    let mut element = GraphElement::default();
    let (Ok(node_re), Ok(rel_re)) = (Regex::new(NODE_PATTERN), Regex::new(RELATIONSHIP_PATTERN))
    else {
        return element;
    };

    for caps in node_re.captures_iter(text) {
        element.add_node(GraphNode {
            id: caps[1].to_string(),
            node_type: caps[2].to_string(),
        });
    }
    for caps in rel_re.captures_iter(text) {
        element.relationships.push(GraphRelationship {
            subj: GraphNode {
                id: caps[1].to_string(),
                node_type: caps[2].to_string(),
            },
            obj: GraphNode {
                id: caps[3].to_string(),
                node_type: caps[4].to_string(),
            },
            rel_type: caps[5].to_string(),
        });
    }
    element
}

/// Stateless extractor; each call is a fresh two-message conversation.
#[derive(Clone)]
pub struct KnowledgeGraphAgent {
    model: Arc<dyn ChatModel>,
}

impl KnowledgeGraphAgent {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn extract(&self, text: &str) -> Result<GraphElement, ChatError> {
        let messages = [
            ChatMessage::system(KG_EXTRACTION_PROMPT),
            ChatMessage::user(format!("Extract the knowledge graph from:\n{}", text)),
        ];
        let replies = self.model.complete(&messages).await?;
        let reply = replies.first().ok_or(ChatError::EmptyResponse)?;
        let element = parse_graph_elements(&reply.content);
        tracing::debug!(
            nodes = element.nodes.len(),
            relationships = element.relationships.len(),
            "Extracted graph elements"
        );
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const SAMPLE: &str = "\
Node(id='global placement', type='Step')
Node(id='RePlAce', type='Tool')
Relationship(subj=Node(id='RePlAce', type='Tool'), obj=Node(id='global placement', type='Step'), type='PERFORMS')
Relationship(subj=Node(id='global placement', type='Step'), obj=Node(id='detailed placement', type='Step'), type='PRECEDES')";

    #[test]
    fn test_parses_nodes_and_relationships() {
        let el = parse_graph_elements(SAMPLE);
        let ids: Vec<&str> = el.node_ids().collect();
        assert_eq!(ids, vec!["global placement", "RePlAce", "detailed placement"]);
        assert_eq!(el.relationships.len(), 2);
        assert_eq!(el.relationships[0].rel_type, "PERFORMS");
        assert_eq!(el.relationships[1].obj.id, "detailed placement");
    }

    #[test]
    fn test_accepts_double_quotes() {
        let el = parse_graph_elements(r#"Node(id="CTS", type="Step")"#);
        assert_eq!(
            el.nodes,
            vec![GraphNode {
                id: "CTS".to_string(),
                node_type: "Step".to_string()
            }]
        );
    }

    #[test]
    fn test_prose_yields_nothing() {
        assert_eq!(parse_graph_elements("There are no entities here."), GraphElement::default());
    }

    struct CannedModel {
        reply: String,
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<Vec<ChatMessage>, ChatError> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok(vec![ChatMessage::assistant(self.reply.clone())])
        }
        fn name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_agent_sends_text_and_parses_reply() {
        let model = Arc::new(CannedModel {
            reply: SAMPLE.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let agent = KnowledgeGraphAgent::new(model.clone());

        let el = agent.extract("How does RePlAce do global placement?").await.unwrap();
        assert_eq!(el.nodes.len(), 3);

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].content.contains("How does RePlAce do global placement?"));
    }
}
