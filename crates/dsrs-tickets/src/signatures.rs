use dsrs_eval::Signature;

use crate::data::{CATEGORIES, PRIORITIES};

fn among(labels: &[&str]) -> String {
    labels.join(", ")
}

/// Category and priority in one call.
pub fn ticket_classifier() -> Signature {
    Signature::new("Classify an IT support ticket by category and priority.")
        .input("ticket", "IT support ticket description")
        .output("category", format!("Category among: {}", among(&CATEGORIES)))
        .output("priority", format!("Priority among: {}", among(&PRIORITIES)))
}

pub fn category_classifier() -> Signature {
    Signature::new("Determine the technical category of an IT ticket.")
        .input("ticket", "Ticket description")
        .output("category", format!("Category among: {}", among(&CATEGORIES)))
}

/// Priority conditioned on an already identified category.
pub fn priority_classifier() -> Signature {
    Signature::new("Determine the priority of a ticket based on its category.")
        .input("ticket", "Ticket description")
        .input("category", "Technical category already identified")
        .output("priority", format!("Priority among: {}", among(&PRIORITIES)))
}
