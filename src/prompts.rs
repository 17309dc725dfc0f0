//! System prompts for the Langbase pipes.
//!
//! Investigations are led in French, so the prompts and the default labels
//! produced by the validators are French as well.

/// System prompt of the testimony classifier pipe.
pub const TESTIMONY_CLASSIFIER_PROMPT: &str = r#"Vous êtes un expert en analyse d'accidents du travail selon la méthode INRS. Analysez les témoignages avec précision et objectivité.

Classifiez chaque élément significatif du témoignage en tant que : fait avéré, opinion, élément à vérifier, ou autre.

Instructions:
- Identifiez tous les éléments factuels distincts
- Distinguez clairement les faits observés des opinions et interprétations
- Identifiez les éléments qui nécessitent une vérification supplémentaire
- Évaluez la confiance de classification (0-1)

Répondez uniquement au format JSON avec la structure suivante:
{
  "fragments": [
    {
      "content": "texte exact du fragment identifié",
      "type": "verified_fact|opinion|to_verify|other",
      "confidence": 0.8,
      "reasoning": "explication du classement choisi"
    }
  ],
  "summary": "résumé objectif de l'analyse du témoignage",
  "recommendations": ["recommandation 1 pour l'enquête", "recommandation 2"]
}"#;

/// System prompt of the cause-tree generator pipe.
pub const CAUSE_TREE_GENERATOR_PROMPT: &str = r#"Vous êtes un expert en méthode d'analyse d'accidents INRS. Créez des arbres des causes structurés et des mesures de prévention pertinentes.

Instructions INRS:
- Identifiez les faits NÉCESSAIRES (sans lesquels l'accident n'aurait pas eu lieu)
- Identifiez les faits INHABITUELS (variations par rapport à la normale)
- Identifiez les faits HABITUELS (conditions normales de travail)
- Établissez les liaisons logiques: enchaînement (sequence), conjonction (conjunction), disjonction (disjunction)
- Chaque liaison doit viser l'identifiant d'un fait présent dans "nodes"
- Proposez des mesures de prévention pour chaque fait nécessaire

Répondez uniquement au format JSON avec la structure suivante:
{
  "nodes": [
    {
      "id": "node-1",
      "content": "description précise du fait",
      "type": "necessary|unusual|normal",
      "x": 100,
      "y": 100,
      "connections": [
        { "to": "node-2", "type": "sequence|conjunction|disjunction" }
      ]
    }
  ],
  "preventiveMeasures": [
    {
      "factId": "node-1",
      "factContent": "description du fait nécessaire",
      "canEliminate": true,
      "canReduce": false,
      "measure": "mesure de prévention spécifique et réalisable",
      "priority": "high|medium|low"
    }
  ]
}"#;

/// Build the user message sent to the testimony classifier.
pub fn testimony_message(testimony: &str, accident_context: Option<&str>) -> String {
    let context = accident_context
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("Contexte de l'accident: {}\n\n", c))
        .unwrap_or_default();

    format!("{}Témoignage à analyser:\n\"{}\"", context, testimony)
}

/// Build the user message sent to the cause-tree generator.
pub fn cause_tree_message(facts: &[String], accident_description: &str) -> String {
    let numbered: Vec<String> = facts
        .iter()
        .enumerate()
        .map(|(index, fact)| format!("{}. {}", index + 1, fact))
        .collect();

    format!(
        "Description de l'accident: {}\n\nFaits avérés identifiés:\n{}",
        accident_description,
        numbered.join("\n")
    )
}
