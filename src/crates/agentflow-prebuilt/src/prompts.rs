//! Prompt templates for the standard Magentic manager
//!
//! Placeholders (`{task}`, `{team}`, `{facts}`, `{plan}`, `{names}`) are
//! substituted with `str::replace`; the templates themselves are fixed for a
//! given release so ledger parsing stays stable.

pub(crate) const TASK_LEDGER_FACTS_PROMPT: &str = "Below is a task the team must address.

{task}

Before planning, survey what is known. List:
1. GIVEN FACTS - facts stated directly in the task
2. FACTS TO LOOK UP - information that must be retrieved
3. FACTS TO DERIVE - conclusions that need computation or reasoning
4. EDUCATED GUESSES - informed assumptions worth recording

Answer with those four sections only.";

pub(crate) const TASK_LEDGER_PLAN_PROMPT: &str = "The team members available are:

{team}

Based on the known facts, produce a concise bullet-point plan for addressing \
the task. Mention which team member handles each step. Do not involve anyone \
outside the team.";

pub(crate) const TASK_LEDGER_TEMPLATE: &str = "We are working to address the following user request:

{task}

To answer this request we have assembled the following team:

{team}

Here is an initial fact sheet to consider:

{facts}

Here is the plan to follow as best as possible:

{plan}";

pub(crate) const TASK_LEDGER_FACTS_UPDATE_PROMPT: &str = "The team has not been able to make \
progress on the task:

{task}

Here is the previous fact sheet:

{facts}

Update it: promote educated guesses that were confirmed, correct anything \
disproven, and add newly learned facts. Keep the same four sections.";

pub(crate) const TASK_LEDGER_PLAN_UPDATE_PROMPT: &str = "The previous plan stalled. The team \
members available are:

{team}

Considering the updated fact sheet, write a new bullet-point plan that avoids \
the previous dead ends. Mention which team member handles each step.";

pub(crate) const PROGRESS_LEDGER_PROMPT: &str = "Recall the request:

{task}

The team members are: {names}

Evaluate the conversation so far and answer with only a JSON object of this \
exact shape:

{
  \"is_request_satisfied\": { \"reason\": string, \"answer\": boolean },
  \"is_in_loop\": { \"reason\": string, \"answer\": boolean },
  \"is_progress_being_made\": { \"reason\": string, \"answer\": boolean },
  \"next_speaker\": { \"reason\": string, \"answer\": string },
  \"instruction_or_question\": { \"reason\": string, \"answer\": string }
}

next_speaker must be one of: {names}.";

pub(crate) const FINAL_ANSWER_PROMPT: &str = "Recall the request:

{task}

The conversation above contains the team's work. Compose a complete final \
answer to the request, addressed directly to the user.";
