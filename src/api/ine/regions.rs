// Geographic partitions used to query the INE indicators.  Each entry becomes
// one request, which keeps the URL length and the response size bounded.
// Codes are NUTS 2013 levels I to III; every code belongs to exactly one entry.

/// Activity sectors (CAE Rev. 3 sections) requested in `Dim3`.
pub const SECTOR_CODES: [&str; 18] = [
    "TOT", "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "L", "M", "N", "P", "Q", "R", "S",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub name: &'static str,
    /// Comma separated geographic area codes.
    pub codes: &'static str,
}

pub const REGIONS: [Region; 29] = [
    Region { name: "Portugal", codes: "PT,1" },
    Region { name: "Norte", codes: "11" },
    Region { name: "Alto Minho", codes: "111" },
    Region { name: "Cávado", codes: "112" },
    Region { name: "Ave", codes: "119" },
    Region { name: "Área Metropolitana do Porto", codes: "11A" },
    Region { name: "Alto Tâmega", codes: "11B" },
    Region { name: "Tâmega e Sousa", codes: "11C" },
    Region { name: "Douro", codes: "11D" },
    Region { name: "Terras de Trás-os-Montes", codes: "11E" },
    Region { name: "Algarve", codes: "15,150" },
    Region { name: "Centro", codes: "16" },
    Region { name: "Oeste", codes: "16B" },
    Region { name: "Aveiro", codes: "16D" },
    Region { name: "Coimbra", codes: "16E" },
    Region { name: "Leiria", codes: "16F" },
    Region { name: "Viseu Dão Lafões", codes: "16G" },
    Region { name: "Beira Baixa", codes: "16H" },
    Region { name: "Médio Tejo", codes: "16I" },
    Region { name: "Beiras e Serra da Estrela", codes: "16J" },
    Region { name: "Área Metropolitana de Lisboa", codes: "17,170" },
    Region { name: "Alentejo", codes: "18" },
    Region { name: "Alentejo Litoral", codes: "181" },
    Region { name: "Baixo Alentejo", codes: "184" },
    Region { name: "Lezíria do Tejo", codes: "185" },
    Region { name: "Alto Alentejo", codes: "186" },
    Region { name: "Alentejo Central", codes: "187" },
    Region { name: "Região Autónoma dos Açores", codes: "2,20,200" },
    Region { name: "Região Autónoma da Madeira", codes: "3,30,300" },
];

pub fn region(name: &str) -> Option<Region> {
    REGIONS.iter().find(|r| r.name == name).copied()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn region_table() {
        let names: HashSet<&str> = REGIONS.iter().map(|r| r.name).collect();
        assert_eq!(names.len(), REGIONS.len());
        assert!(REGIONS
            .iter()
            .all(|r| r.codes.split(',').all(|c| !c.trim().is_empty())));
        assert_eq!(region("Aveiro").unwrap().codes, "16D");
        assert!(region("Atlantis").is_none());
    }

    #[test]
    fn codes_are_requested_once() {
        let codes: Vec<&str> = REGIONS.iter().flat_map(|r| r.codes.split(',')).collect();
        let unique: HashSet<&str> = codes.iter().copied().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
