//! Prompt templates for the expert chain.

use crate::schema::OutputSchema;

/// Formatting instructions telling the model to answer with JSON matching `schema`.
pub fn format_instructions(schema: &OutputSchema) -> String {
    let schema_json = serde_json::to_string_pretty(&schema.to_json_schema())
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "Respond with a single JSON object that conforms to the JSON Schema below. \
         Include every listed property and no others. Do not add any text before or \
         after the JSON.\n\n```json\n{schema_json}\n```"
    )
}

/// Build the primary prompt for a tool-selection question.
pub fn expert_prompt(context: &str, query: &str, instructions: &str) -> String {
    format!(
        "You are a machining expert that helps users choose cutting tools.\n\
         Reference material retrieved for this question:\n\
         {context}\n\n\
         Answer the user's question as well as you can. Use the reference material \
         where it helps, but rely on your own machining expertise as the main driver \
         of the decision.\n\n\
         {instructions}\n\n\
         Question: {query}"
    )
}

/// Build a repair prompt for a completion that failed to parse.
pub fn repair_prompt(instructions: &str, completion: &str, error: &str) -> String {
    format!(
        "Instructions:\n{instructions}\n\n\
         Completion:\n{completion}\n\n\
         The completion above does not satisfy the instructions.\n\
         Error: {error}\n\n\
         Reply again with only a corrected answer that satisfies the instructions."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;

    #[test]
    fn expert_prompt_embeds_every_part() {
        let schema =
            OutputSchema::build(&[FieldDescriptor::new("toolType", "string", "tool type")]);
        let instructions = format_instructions(&schema);
        let prompt = expert_prompt("carbide grades", "Which end mill?", &instructions);
        assert!(prompt.contains("carbide grades"));
        assert!(prompt.contains("Question: Which end mill?"));
        assert!(prompt.contains("\"toolType\""));
    }

    #[test]
    fn repair_prompt_quotes_error_and_completion() {
        let prompt =
            repair_prompt("answer in JSON", "{\"toolType\": 5}", "field `toolType` must be string");
        assert!(prompt.contains("{\"toolType\": 5}"));
        assert!(prompt.contains("must be string"));
    }
}
