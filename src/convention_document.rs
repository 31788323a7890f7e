use crate::{
    data::{convention::StageType, student::Student},
    error::{FormatTimeSnafu, StagehandResult},
};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use snafu::ResultExt;
use time::{Date, macros::format_description};

/// Boilerplate paragraphs that differ by stage.
struct StageContent {
    objectives_intro: &'static str,
    objectives: [&'static str; 4],
    duration: &'static str,
    period: &'static str,
    supervision: &'static [&'static str],
    evaluation: [&'static str; 3],
}

const fn content_for(stage: StageType) -> StageContent {
    match stage {
        StageType::Initiation => StageContent {
            objectives_intro: "Le stage d'initiation en première année vise à :",
            objectives: [
                "Découvrir le monde professionnel et l'entreprise",
                "Acquérir une première expérience pratique",
                "Développer les compétences relationnelles",
                "Confirmer l'orientation professionnelle",
            ],
            duration: "4 à 6 semaines",
            period: "Été de la première année",
            supervision: &[
                "Un tuteur professionnel dans l'entreprise",
                "Un enseignant référent de l'ENSAM",
            ],
            evaluation: [
                "Rapport de stage (60%)",
                "Évaluation du tuteur professionnel (25%)",
                "Soutenance orale (15%)",
            ],
        },
        StageType::FinAnnee => StageContent {
            objectives_intro: "Le stage de fin d'année en deuxième année vise à :",
            objectives: [
                "Approfondir les connaissances techniques",
                "Participer à des projets concrets",
                "Développer l'autonomie professionnelle",
                "Préparer l'insertion en stage de fin d'études",
            ],
            duration: "6 à 8 semaines",
            period: "Été de la deuxième année",
            supervision: &[
                "Un maître de stage dans l'entreprise",
                "Un enseignant référent de l'ENSAM",
                "Visites périodiques de suivi",
            ],
            evaluation: [
                "Rapport de stage détaillé (50%)",
                "Évaluation du maître de stage (30%)",
                "Soutenance avec jury (20%)",
            ],
        },
        StageType::FinEtudes => StageContent {
            objectives_intro: "Le stage de fin d'études en troisième année vise à :",
            objectives: [
                "Réaliser un projet d'ingénieur complet",
                "Mettre en application l'ensemble des connaissances acquises",
                "Préparer l'insertion professionnelle",
                "Développer l'expertise dans la spécialité choisie",
            ],
            duration: "4 à 6 mois",
            period: "Dernière année d'études",
            supervision: &[
                "Un ingénieur tuteur dans l'entreprise",
                "Un directeur de mémoire à l'ENSAM",
                "Comité de suivi tripartite",
            ],
            evaluation: [
                "Mémoire de fin d'études (40%)",
                "Évaluation entreprise (30%)",
                "Soutenance devant jury d'experts (30%)",
            ],
        },
    }
}

/// The dates quoted in Article 1 for a stage taking place in `year`.
pub fn article_one_period(stage: StageType, year: i32) -> String {
    match stage {
        StageType::Initiation | StageType::FinAnnee => format!("01 Juillet au 31 Août {year}"),
        StageType::FinEtudes => format!("01 janvier au 30 juin {year}"),
    }
}

/// `2025-2026` style label for the year starting in `year`.
pub fn academic_year(year: i32) -> String {
    format!("{year}-{}", year + 1)
}

const STYLE: &str = r"
@page { margin: 2.5cm 2cm; size: A4; }
body { font-family: 'Times New Roman', serif; line-height: 1.6; margin: 40px; color: #000; }
.header { text-align: center; margin-bottom: 40px; border-bottom: 2px solid #000; padding-bottom: 20px; }
.logo { font-size: 24px; font-weight: bold; color: #d32f2f; }
.title { font-size: 20px; font-weight: bold; margin: 20px 0; text-transform: uppercase; }
.student-info { background: #f5f5f5; padding: 20px; border-left: 4px solid #d32f2f; margin: 20px 0; }
.label { font-weight: bold; display: inline-block; width: 170px; }
.footer { margin-top: 50px; display: flex; justify-content: space-between; }
.signature { text-align: center; width: 220px; border-top: 1px solid #000; padding-top: 10px; }
@media print { body { margin: 20px; } .no-print { display: none; } }
";

fn info_row(label: &str, value: &str) -> Markup {
    html! {
        div class="info-row" {
            span class="label" { (label) " :" }
            " " (value)
        }
    }
}

fn bullet_list(items: &[&str]) -> Markup {
    html! {
        ul {
            @for item in items {
                li { (item) }
            }
        }
    }
}

/// Renders the printable convention for `student`. Every student value goes through
/// maud's escaping.
pub fn render_convention(
    student: &Student,
    stage: StageType,
    generated_on: Date,
) -> StagehandResult<Markup> {
    let content = content_for(stage);
    let generated = generated_on
        .format(format_description!("[day]/[month]/[year]"))
        .context(FormatTimeSnafu)?;
    let annee = format!("{}ème année", student.annee);

    Ok(html! {
        (DOCTYPE)
        html lang="fr" {
            head {
                meta charset="UTF-8";
                title { "Convention de Stage - " (student.nom) }
                style { (PreEscaped(STYLE)) }
            }
            body {
                div class="no-print" style="text-align: right;" {
                    button onclick="window.print()" { "Imprimer / Enregistrer en PDF" }
                }

                div class="header" {
                    div class="logo" { "ÉCOLE NATIONALE SUPÉRIEURE D'ARTS ET MÉTIERS" }
                    div style="font-size: 16px; margin: 10px 0;" { "ENSAM - RABAT" }
                    div class="title" { "Convention de " (stage.title()) }
                }

                p {
                    strong { "Année Universitaire : " }
                    (academic_year(generated_on.year()))
                }

                div class="student-info" {
                    h3 { "Informations de l'étudiant(e)" }
                    (info_row("Nom complet", &student.nom))
                    (info_row("Email", &student.email))
                    (info_row("Téléphone", student.telephone.as_deref().unwrap_or("Non renseigné")))
                    (info_row("Filière", &student.filiere))
                    (info_row("Année", &annee))
                    (info_row("Code Apogée", &student.code_apogee))
                    (info_row("CNE", &student.cne))
                    (info_row("CIN", &student.cin))
                    (info_row("Date de naissance", &student.date_naissance))
                }

                h3 { "Article 1 : Objet" }
                p {
                    "La présente convention règle les rapports entre les trois partenaires : l'entreprise, l'ENSAM de Rabat et l'étudiant pour un "
                    (stage.title())
                    " qui fait partie des modules du cycle d'Ingénieur ayant lieu du "
                    (article_one_period(stage, generated_on.year()))
                    "."
                }

                h3 { "Objectifs du stage" }
                p { (content.objectives_intro) }
                (bullet_list(&content.objectives))

                h3 { "Durée et période" }
                p { strong { "Durée : " } (content.duration) }
                p { strong { "Période : " } (content.period) }

                h3 { "Modalités d'encadrement" }
                p { "L'étudiant sera encadré par :" }
                (bullet_list(content.supervision))

                h3 { "Modalités d'évaluation" }
                p { "L'évaluation se basera sur :" }
                (bullet_list(&content.evaluation))

                div class="footer" {
                    div class="signature" {
                        div { "Signature de l'étudiant(e)" }
                        div style="height: 60px;" {}
                        div { "Date : " (generated) }
                    }
                    div class="signature" {
                        div { "Cachet et signature de l'entreprise" }
                        div style="height: 60px;" {}
                        div { "Date : ________________" }
                    }
                    div class="signature" {
                        div { "Cachet et signature de l'administration" }
                        div style="height: 60px;" {}
                        div { "Date : ________________" }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Month, OffsetDateTime};

    fn student(annee: i32) -> Student {
        Student {
            id: 1,
            nom: "Ali <b>Benali</b>".into(),
            email: "ali@ensam.ac.ma".into(),
            telephone: None,
            filiere: "Génie Informatique".into(),
            annee,
            code_apogee: "AP1".into(),
            cne: "CNE1".into(),
            cin: "CIN1".into(),
            date_naissance: "2002-01-01".into(),
            is_registered: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn render(annee: i32) -> String {
        let date = Date::from_calendar_date(2025, Month::March, 7).unwrap();
        render_convention(&student(annee), StageType::from_year(annee), date)
            .unwrap()
            .into_string()
    }

    #[test]
    fn student_values_are_escaped() {
        let html = render(1);
        assert!(html.contains("Ali &lt;b&gt;Benali&lt;/b&gt;"));
        assert!(!html.contains("<b>Benali"));
    }

    #[test]
    fn document_carries_stage_dates_and_fallbacks() {
        let html = render(3);
        assert!(html.contains("Stage de Fin d'Études"));
        assert!(html.contains("01 janvier au 30 juin 2025"));
        assert!(html.contains("2025-2026"));
        assert!(html.contains("07/03/2025"));
        assert!(html.contains("Non renseigné"));
        assert!(html.contains("4 à 6 mois"));
    }

    #[test]
    fn summer_stages_share_a_period() {
        assert_eq!(
            article_one_period(StageType::Initiation, 2024),
            article_one_period(StageType::FinAnnee, 2024)
        );
        assert!(!render(2).contains("Comité de suivi tripartite"));
        assert!(render(2).contains("Visites périodiques de suivi"));
    }
}
