use std::fmt::Write as _;

use dsrs_eval::{Dataset, DatasetError, Example, LabelSet, example};
use indexmap::IndexMap;

pub const CATEGORIES: [&str; 8] = [
    "Hardware",
    "Software",
    "Network",
    "Application",
    "Infrastructure",
    "Account",
    "Email",
    "Peripherals",
];

pub const PRIORITIES: [&str; 5] = ["Low", "Medium", "High", "Urgent", "Critical"];

const TRAIN: [(&str, &str, &str); 15] = [
    (
        "Mon ordinateur ne démarre plus depuis ce matin. J'ai une présentation importante dans 2 heures avec le client.",
        "Hardware",
        "Urgent",
    ),
    (
        "Je n'arrive pas à me connecter à l'imprimante du 3e étage. Ça peut attendre la semaine prochaine.",
        "Peripherals",
        "Low",
    ),
    (
        "Le VPN ne fonctionne plus. Impossible d'accéder aux fichiers du serveur pour finaliser le rapport trimestriel.",
        "Network",
        "High",
    ),
    (
        "J'ai oublié mon mot de passe Outlook. Je peux utiliser le webmail en attendant.",
        "Account",
        "Medium",
    ),
    (
        "Le site web de l'entreprise affiche une erreur 500. Les clients ne peuvent plus commander en ligne!",
        "Application",
        "Critical",
    ),
    (
        "Ma souris sans fil ne répond plus bien. Les piles sont peut-être faibles.",
        "Peripherals",
        "Low",
    ),
    (
        "Le système de paie ne calcule pas correctement les heures supplémentaires. C'est la fin du mois.",
        "Application",
        "Urgent",
    ),
    (
        "J'aimerais avoir une mise à jour de mon logiciel Adobe quand vous aurez le temps.",
        "Software",
        "Low",
    ),
    (
        "Le serveur de base de données est très lent depuis 1 heure. Toute la production est impactée.",
        "Infrastructure",
        "Critical",
    ),
    (
        "Je ne reçois plus les emails depuis ce matin. J'attends des réponses importantes de fournisseurs.",
        "Email",
        "High",
    ),
    (
        "Mon écran externe ne s'affiche plus. Je peux travailler sur l'écran du laptop.",
        "Hardware",
        "Medium",
    ),
    (
        "Le wifi de la salle de conférence A ne fonctionne pas. J'ai une réunion avec des externes dans 30 minutes.",
        "Network",
        "Urgent",
    ),
    (
        "Je voudrais installer Slack sur mon poste de travail pour mieux collaborer avec l'équipe.",
        "Software",
        "Medium",
    ),
    (
        "Le système de sauvegarde a échoué cette nuit selon le rapport automatique.",
        "Infrastructure",
        "High",
    ),
    (
        "Mon clavier a une touche qui colle. C'est gérable mais un peu ennuyeux.",
        "Peripherals",
        "Low",
    ),
];

const VALIDATION: [(&str, &str, &str); 7] = [
    (
        "Le serveur de fichiers est inaccessible. Personne ne peut travailler sur les documents partagés.",
        "Infrastructure",
        "Critical",
    ),
    (
        "J'ai besoin d'accès au dossier comptabilité pour compléter l'audit. C'est urgent.",
        "Account",
        "Urgent",
    ),
    (
        "L'écran de mon collègue qui est en vacances clignote. On peut attendre son retour.",
        "Hardware",
        "Low",
    ),
    (
        "Le logiciel de CRM plante à chaque fois que j'essaie d'exporter les contacts.",
        "Application",
        "High",
    ),
    (
        "Je voudrais changer ma photo de profil dans l'annuaire quand vous aurez un moment.",
        "Account",
        "Low",
    ),
    (
        "Le système de vidéoconférence ne fonctionne pas. J'ai une réunion avec New York dans 10 minutes!",
        "Application",
        "Critical",
    ),
    (
        "Mon antivirus affiche un message d'expiration mais tout semble fonctionner normalement.",
        "Software",
        "Medium",
    ),
];

/// Ticket used by `classify` and the basic-usage scenario when none is given.
pub const SAMPLE_TICKET: &str =
    "Mon ordinateur ne démarre plus. J'ai une présentation dans 1 heure.";

pub fn ticket(text: &str, category: &str, priority: &str) -> Example {
    example! {
        "ticket": "input" => text,
        "category": "output" => category,
        "priority": "output" => priority,
    }
}

fn to_examples(rows: &[(&str, &str, &str)]) -> Vec<Example> {
    rows.iter()
        .map(|(text, category, priority)| ticket(text, category, priority))
        .collect()
}

pub fn trainset() -> Vec<Example> {
    to_examples(&TRAIN)
}

pub fn valset() -> Vec<Example> {
    to_examples(&VALIDATION)
}

/// Bundled tickets as a checked train/validation pair.
pub fn dataset() -> Result<Dataset, DatasetError> {
    Dataset::new(trainset(), valset())
}

/// Category labels with the French and English synonyms small models tend to answer.
pub fn category_labels() -> LabelSet {
    LabelSet::new(CATEGORIES, "Application")
        .alias("hard", "Hardware")
        .alias("matér", "Hardware")
        .alias("soft", "Software")
        .alias("logic", "Software")
        .alias("réseau", "Network")
        .alias("network", "Network")
        .alias("compte", "Account")
        .alias("account", "Account")
}

pub fn priority_labels() -> LabelSet {
    LabelSet::new(PRIORITIES, "Low")
        .alias("critic", "Critical")
        .alias("critique", "Critical")
        .alias("urgent", "Urgent")
        .alias("high", "High")
        .alias("haut", "High")
        .alias("medium", "Medium")
        .alias("moyen", "Medium")
}

fn distribution<'a>(examples: &'a [Example], field: &str, labels: &[&'a str]) -> IndexMap<&'a str, usize> {
    let mut counts: IndexMap<&str, usize> = labels.iter().map(|label| (*label, 0)).collect();
    for example in examples {
        if let Some(value) = example.label(field) {
            *counts.entry(value).or_default() += 1;
        }
    }
    counts
}

/// Split sizes and label distributions, one line per label.
pub fn render_stats(dataset: &Dataset) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Training examples:   {}\nValidation examples: {}",
        dataset.train().len(),
        dataset.validation().len()
    );

    for (title, field, labels) in [
        ("Categories", "category", &CATEGORIES[..]),
        ("Priorities", "priority", &PRIORITIES[..]),
    ] {
        let train = distribution(dataset.train(), field, labels);
        let validation = distribution(dataset.validation(), field, labels);
        let _ = writeln!(out, "\n{title} (train / validation):");
        for (label, count) in &train {
            let _ = writeln!(
                out,
                "  {label:<15} {count:>2} / {}",
                validation.get(label).copied().unwrap_or(0)
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_splits_are_disjoint_and_sized() {
        let dataset = dataset().expect("bundled splits never overlap");
        assert_eq!(dataset.train().len(), 15);
        assert_eq!(dataset.validation().len(), 7);
    }

    #[test]
    fn every_label_is_canonical() {
        for example in trainset().iter().chain(valset().iter()) {
            let category = example.label("category").unwrap_or_default();
            let priority = example.label("priority").unwrap_or_default();
            assert!(CATEGORIES.contains(&category), "{category}");
            assert!(PRIORITIES.contains(&priority), "{priority}");
            assert_eq!(example.input_keys, vec!["ticket"]);
        }
    }

    #[test]
    fn stats_count_each_label() {
        let stats = render_stats(&dataset().expect("valid"));
        assert!(stats.contains("Training examples:   15"));
        assert!(stats.contains("Peripherals      3 / 0"));
        assert!(stats.contains("Critical         2 / 2"));
    }

    #[test]
    fn synonyms_resolve_to_canonical_labels() {
        assert_eq!(category_labels().resolve("Problème matériel").0, "Hardware");
        assert_eq!(priority_labels().resolve("Très haute").0, "High");
        assert_eq!(priority_labels().resolve("???"), ("Low".to_string(), false));
    }
}
