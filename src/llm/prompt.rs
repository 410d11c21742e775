//! Prompt templates

use super::GraphRequest;
use crate::graph::SceneGraph;

pub const GRAPH_SYSTEM_PROMPT: &str = "You are a semantic scene graph generator for a 2D game and world design tool. \
Given a prompt describing a location or world, generate a graph of interconnected nodes representing \
sub-locations, elements and their spatial relationships.

Position nodes by their real-world spatial meaning:
- Vertical (y): sky, canopy and rooftops at the top (y 0.55 to 0.95), ground level in the middle \
(y -0.35 to 0.45), underground and basements at the bottom (y -0.95 to -0.55)
- Horizontal (x): entrances at the edges, central plazas in the middle, related areas clustered together
- Forest canopy above clearings, roots and caves below

Coordinates range from -1.0 to 1.0 on both axes.

Rules:
- Each node is a distinct location, landmark or element
- Edges are spatial relationships (adjacent_to, connected_to, contains, leads_to, overlooks, inside)
- Node types: location, landmark, element, character, atmosphere, region, sky, underground
- Size ranges from 0.5 (minor) to 2.0 (major landmark)

Respond with valid JSON only, no markdown or explanation.";

const DEPTH_SCALE: &str = "0=world, 1=region, 2=area, 3=building, 4=room";

/// Prompt asking for a complete graph
pub fn generation_prompt(request: &GraphRequest) -> String {
    let mut context = String::new();
    if let Some(parent) = &request.parent {
        context.push_str(&format!(
            "This scene is the inside of \"{}\" ({}): {}\n",
            parent.name, parent.semantic_type, parent.description
        ));
    }
    if let Some(extra) = &request.context {
        context.push_str(&format!("Context from parent: {}\n", extra));
    }

    format!(
        r#"Create a semantic scene graph for: "{prompt}"

{context}
Depth level: {depth} ({scale})
Generate exactly {count} nodes with detail appropriate for this depth level.
Higher depth means more granular details.

Position each node with x,y coordinates between -1.0 and 1.0:
- +y is UP (sky, canopy, rooftops), -y is DOWN (underground, basements)
- -x is LEFT/WEST, +x is RIGHT/EAST
- Central areas near (0, 0), entrances and exits at the edges

Respond with this exact JSON structure:
{{
  "nodes": [
    {{
      "name": "Node Name",
      "description": "Brief description of this location or element",
      "node_type": "location|landmark|element|character|atmosphere|region|sky|underground",
      "size": 1.0,
      "is_expandable": true,
      "x": 0.0,
      "y": 0.0
    }}
  ],
  "edges": [
    {{
      "source": "Source Node Name",
      "target": "Target Node Name",
      "relationship": "connected_to|adjacent_to|contains|leads_to|overlooks|inside",
      "label": ""
    }}
  ],
  "summary": "One-sentence summary of the generated scene"
}}"#,
        prompt = request.prompt,
        context = context,
        depth = request.depth,
        scale = DEPTH_SCALE,
        count = request.node_count,
    )
}

/// Prompt asking for an ordered edit batch against `current`
pub fn edit_prompt(instruction: &str, current: &SceneGraph) -> String {
    format!(
        r#"Current scene graph:
{graph}

User instruction: "{instruction}"

Describe the change as an ordered list of operations. Later operations may
refer to nodes added earlier in the list. Refer to existing nodes by id.
Keep existing nodes unless the instruction asks to remove them, and keep
their positions unless the change requires moving them. Omit "position" on
new nodes to have them placed automatically.

Respond with this exact JSON structure:
{{
  "summary": "Summary of the changes",
  "operations": [
    {{"op": "add_node", "id": "optional_id", "name": "Name", "description": "", "node_type": "location", "size": 1.0, "is_expandable": true}},
    {{"op": "update_node", "id": "node_id", "changes": {{"name": "New name", "description": "New description", "position": {{"x": 0.0, "y": 0.0}}}}}},
    {{"op": "remove_node", "id": "node_id"}},
    {{"op": "add_edge", "source": "node_id", "target": "node_id", "relationship": "leads_to", "label": ""}},
    {{"op": "update_edge", "source": "node_id", "target": "node_id", "relationship": "overlooks"}},
    {{"op": "remove_edge", "source": "node_id", "target": "node_id"}},
    {{"op": "expand", "id": "node_id"}}
  ]
}}"#,
        graph = current.to_prompt_json(),
        instruction = instruction,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SemanticType;
    use crate::llm::ParentContext;

    #[test]
    fn test_generation_prompt_mentions_request() {
        let mut request = GraphRequest::root("A misty harbor town", 6);
        request.depth = 2;
        request.parent = Some(ParentContext {
            name: "Harbor".to_string(),
            description: "Old stone docks".to_string(),
            semantic_type: SemanticType::Region,
        });

        let prompt = generation_prompt(&request);
        assert!(prompt.contains("A misty harbor town"));
        assert!(prompt.contains("exactly 6 nodes"));
        assert!(prompt.contains("Depth level: 2"));
        assert!(prompt.contains("inside of \"Harbor\" (region)"));
    }

    #[test]
    fn test_edit_prompt_embeds_graph() {
        let graph = SceneGraph::new("g1", "Harbor");
        let prompt = edit_prompt("add a lighthouse", &graph);
        assert!(prompt.contains("\"name\": \"Harbor\""));
        assert!(prompt.contains("add a lighthouse"));
    }
}
