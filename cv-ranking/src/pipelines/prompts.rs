//! Prompt builders shared by the pipelines

use crate::candidates::Cv;
use crate::criteria::{CriteriaSet, Criterion, Rating};
use crate::store::CriterionEvaluation;

use super::parse::FINAL_RANKING_MARKER;

fn rating_scale() -> String {
    Rating::all()
        .iter()
        .map(|r| format!("{} ({})", r.label(), r.score()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn rating_choices() -> String {
    Rating::all()
        .iter()
        .map(|r| r.label())
        .collect::<Vec<_>>()
        .join("|")
}

/// CVs separated by horizontal rules, each headed by its id
pub fn cv_block(cvs: &[Cv]) -> String {
    cvs.iter()
        .map(|cv| format!("CV (ID: {}):\n{}\n", cv.id, cv.content.trim()))
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

fn rankings_format(cvs: &[Cv]) -> String {
    let example_id = cvs.first().map(|cv| cv.id.as_str()).unwrap_or("cv_id");
    format!(
        r#"{{
    "rankings": [
        {{
            "cv_id": "{}",
            "name": "Candidate name",
            "rating": "{}",
            "reasoning": "Why this rating, citing the criteria"
        }}
    ]
}}"#,
        example_id,
        rating_choices()
    )
}

fn ranking_preamble(job_description: &str, criteria: &CriteriaSet, cvs: &[Cv]) -> String {
    format!(
        "You are evaluating {count} candidates for the role below.\n\n\
         Job Description:\n{job}\n\n\
         Evaluation Criteria:\n{rubric}\n\
         Rating scale: {scale}.\n\n\
         Candidates:\n{cvs}",
        count = cvs.len(),
        job = job_description.trim(),
        rubric = criteria.rubric_text(),
        scale = rating_scale(),
        cvs = cv_block(cvs),
    )
}

/// Single call rating every CV at once
pub fn one_shot_prompt(job_description: &str, criteria: &CriteriaSet, cvs: &[Cv]) -> String {
    format!(
        "{preamble}\n\
         Rate every candidate above against the criteria. Include exactly one entry per CV, \
         using the CV ID exactly as given.\n\n\
         Respond in JSON with the following structure:\n{format}",
        preamble = ranking_preamble(job_description, criteria, cvs),
        format = rankings_format(cvs),
    )
}

/// Single call with explicit step-by-step scaffolding before the final block
pub fn chain_of_thought_prompt(job_description: &str, criteria: &CriteriaSet, cvs: &[Cv]) -> String {
    let steps = criteria
        .criteria()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "Step {}: For each candidate, assess \"{}\" and cite the evidence you rely on.",
                i + 1,
                c.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{preamble}\n\
         Think through the evaluation step by step:\n\
         {steps}\n\
         Step {synthesis}: Weigh the criteria together and decide each candidate's overall rating.\n\n\
         After your reasoning, write a line containing only `{marker}` followed by JSON with \
         exactly one entry per CV, using the CV ID exactly as given:\n{format}",
        preamble = ranking_preamble(job_description, criteria, cvs),
        steps = steps,
        synthesis = criteria.len() + 1,
        marker = FINAL_RANKING_MARKER,
        format = rankings_format(cvs),
    )
}

/// One criterion, one CV. Only that criterion's rubric section is embedded.
pub fn criterion_prompt(job_description: &str, criterion: &Criterion, cv: &Cv) -> String {
    format!(
        "Evaluate this candidate against the \"{name}\" criterion.\n\n\
         Job Description:\n{job}\n\n\
         Criterion Details:\n{section}\n\
         Candidate to Evaluate:\n{cv}\n\
         Rate their fit to this criterion only, as one of: {choices}.\n\n\
         Provide your evaluation in JSON format:\n\
         {{\n    \"cv_id\": \"{id}\",\n    \"rating\": \"{choices}\",\n    \
         \"evidence\": \"Specific evidence from the CV supporting this rating\"\n}}",
        name = criterion.name,
        job = job_description.trim(),
        section = criterion.rubric_text(),
        cv = cv_block(std::slice::from_ref(cv)),
        choices = rating_choices(),
        id = cv.id,
    )
}

/// One criterion covering every CV in a single call
pub fn batched_criterion_prompt(job_description: &str, criterion: &Criterion, cvs: &[Cv]) -> String {
    let example_id = cvs.first().map(|cv| cv.id.as_str()).unwrap_or("cv_id");
    format!(
        "Evaluate each of the {count} candidates below against the \"{name}\" criterion.\n\n\
         Job Description:\n{job}\n\n\
         Criterion Details:\n{section}\n\
         Candidates:\n{cvs}\n\
         Rate each candidate's fit to this criterion only, as one of: {choices}. \
         Include exactly one entry per CV, using the CV ID exactly as given.\n\n\
         Provide your evaluations in JSON format:\n\
         {{\n    \"evaluations\": [\n        {{\n            \"cv_id\": \"{id}\",\n            \
         \"rating\": \"{choices}\",\n            \"evidence\": \"Specific evidence from the CV\"\n        }}\n    ]\n}}",
        count = cvs.len(),
        name = criterion.name,
        job = job_description.trim(),
        section = criterion.rubric_text(),
        cvs = cv_block(cvs),
        choices = rating_choices(),
        id = example_id,
    )
}

/// Synthesis over one CV's criterion evaluations; the model picks the overall rating
pub fn synthesis_prompt(job_description: &str, cv: &Cv, evaluations: &[CriterionEvaluation]) -> String {
    let assessments = evaluations
        .iter()
        .map(|e| format!("- {}: {}\n  Evidence: {}", e.criterion, e.rating.label(), e.rationale))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Synthesize the criterion assessments below into an overall rating for this candidate.\n\n\
         Job Description:\n{job}\n\n\
         Candidate:\n{cv}\n\
         Criterion Assessments:\n{assessments}\n\n\
         Rating scale: {scale}.\n\n\
         Provide your final assessment in JSON format:\n\
         {{\n    \"rating\": \"{choices}\",\n    \"reasoning\": \"How the criterion assessments combine into this rating\"\n}}",
        job = job_description.trim(),
        cv = cv_block(std::slice::from_ref(cv)),
        assessments = assessments,
        scale = rating_scale(),
        choices = rating_choices(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::default_criteria;

    #[test]
    fn test_criterion_prompt_embeds_only_its_section() {
        let criteria = default_criteria();
        let cv = Cv::new("cv7", "# Jane Doe\nFounder");
        let target = &criteria.criteria()[1];
        let prompt = criterion_prompt("Founding operator", target, &cv);

        assert!(prompt.contains(&format!("# {}", target.name)));
        for other in criteria.criteria().iter().filter(|c| c.key != target.key) {
            assert!(!prompt.contains(&format!("# {}", other.name)));
        }
        assert!(prompt.contains("CV (ID: cv7)"));
    }

    #[test]
    fn test_whole_set_prompts_list_every_cv() {
        let criteria = default_criteria();
        let cvs = vec![Cv::new("a", "Alpha"), Cv::new("b", "Beta")];

        let one_shot = one_shot_prompt("job", &criteria, &cvs);
        assert!(one_shot.contains("CV (ID: a)") && one_shot.contains("CV (ID: b)"));
        assert!(one_shot.contains("\"rankings\""));

        let cot = chain_of_thought_prompt("job", &criteria, &cvs);
        assert!(cot.contains(FINAL_RANKING_MARKER));
        assert!(cot.contains("Step 4:"));
    }
}
