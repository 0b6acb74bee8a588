//! Static registry of the nine UCRIF organizational groups
//!
//! Each group maps to one form in the browser client and to one storage
//! collection. The two investigative groups share the `operations`
//! collection; the statistics entry is a pseudo-group with no collection.

use once_cell::sync::Lazy;

/// Descriptor for one organizational group, immutable after startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    /// Stable key used in requests and routing
    pub key: &'static str,
    /// Display name, also the value of the `grupo` field on stored records
    pub name: &'static str,
    /// Icon identifier for the client menu
    pub icon: &'static str,
    /// Short description shown on the client menu
    pub description: &'static str,
    /// Storage collection, or None for pseudo-groups
    pub collection: Option<&'static str>,
}

/// All groups, in menu order
pub static GROUPS: Lazy<Vec<Group>> = Lazy::new(|| {
    vec![
        Group {
            key: "grupo1",
            name: "Grupo 1\u{ba} Expulsiones",
            icon: "plane",
            description: "Expulsiones, conducciones y vuelos fletados",
            collection: Some("grupo1_novedades"),
        },
        Group {
            key: "grupo2",
            name: "Grupo 2\u{ba} Investigaci\u{f3}n",
            icon: "search",
            description: "Operaciones contra redes de inmigraci\u{f3}n irregular",
            collection: Some("operations"),
        },
        Group {
            key: "grupo3",
            name: "Grupo 3\u{ba} Investigaci\u{f3}n",
            icon: "search",
            description: "Operaciones contra la trata de seres humanos",
            collection: Some("operations"),
        },
        Group {
            key: "grupo4",
            name: "Grupo 4\u{ba} Puesto Fronterizo",
            icon: "anchor",
            description: "Control del puesto fronterizo del puerto",
            collection: Some("grupo4_novedades"),
        },
        Group {
            key: "cie",
            name: "C.I.E.",
            icon: "building",
            description: "Centro de Internamiento de Extranjeros",
            collection: Some("cie_novedades"),
        },
        Group {
            key: "coordinacion",
            name: "Coordinaci\u{f3}n",
            icon: "radio",
            description: "Sala de coordinaci\u{f3}n y gesti\u{f3}n de efectivos",
            collection: Some("coordinacion_novedades"),
        },
        Group {
            key: "documentacion",
            name: "Documentaci\u{f3}n",
            icon: "folder",
            description: "Tramitaci\u{f3}n de expedientes y documentaci\u{f3}n",
            collection: Some("documentacion_novedades"),
        },
        Group {
            key: "falsedades",
            name: "Falsedades Documentales",
            icon: "shield",
            description: "Detecci\u{f3}n de documentos falsos en frontera",
            collection: Some("falsedades_novedades"),
        },
        Group {
            key: "estadistica",
            name: "Estad\u{ed}stica",
            icon: "chart",
            description: "Resumen de actividad y tareas pendientes",
            collection: None,
        },
    ]
});

/// Look up a group by its stable key
pub fn by_key(key: &str) -> Option<&'static Group> {
    GROUPS.iter().find(|g| g.key == key)
}

/// True when `collection` belongs to some group
pub fn is_known_collection(collection: &str) -> bool {
    GROUPS.iter().any(|g| g.collection == Some(collection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nine_groups_defined() {
        assert_eq!(GROUPS.len(), 9);
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = GROUPS.iter().map(|g| g.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), GROUPS.len());
    }

    #[test]
    fn test_investigative_groups_share_operations_collection() {
        assert_eq!(by_key("grupo2").unwrap().collection, Some("operations"));
        assert_eq!(by_key("grupo3").unwrap().collection, Some("operations"));
    }

    #[test]
    fn test_statistics_has_no_collection() {
        assert_eq!(by_key("estadistica").unwrap().collection, None);
    }

    #[test]
    fn test_known_collection_lookup() {
        assert!(is_known_collection("grupo1_novedades"));
        assert!(is_known_collection("operations"));
        assert!(!is_known_collection("no_such_collection"));
    }

    #[test]
    fn test_unknown_key_returns_none() {
        assert!(by_key("grupo99").is_none());
    }
}
