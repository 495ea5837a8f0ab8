use serde::Serialize;

/// Statutory limits attached to a zoning classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoningInfo {
    pub description: &'static str,
    pub building_height_limit: &'static str,
    pub floor_area_ratio: &'static str,
    pub land_use_restrictions: &'static str,
}

const UNKNOWN: ZoningInfo = ZoningInfo {
    description: "用途地域の詳細情報がありません",
    building_height_limit: "不明",
    floor_area_ratio: "不明",
    land_use_restrictions: "不明",
};

const ZONING_TABLE: &[(&str, ZoningInfo)] = &[
    (
        "第一種低層住居専用地域",
        ZoningInfo {
            description: "低層住宅の良好な住環境を保護する地域",
            building_height_limit: "10mまたは12m",
            floor_area_ratio: "50%〜200%",
            land_use_restrictions: "住宅、共同住宅、寄宿舎、下宿、小規模な店舗・事務所等",
        },
    ),
    (
        "第二種低層住居専用地域",
        ZoningInfo {
            description: "主として低層住宅の良好な住環境を保護する地域",
            building_height_limit: "10mまたは12m",
            floor_area_ratio: "50%〜200%",
            land_use_restrictions: "第一種低層住居専用地域の用途に加え、小規模な店舗・事務所等",
        },
    ),
    (
        "第一種中高層住居専用地域",
        ZoningInfo {
            description: "中高層住宅の良好な住環境を保護する地域",
            building_height_limit: "15m",
            floor_area_ratio: "100%〜300%",
            land_use_restrictions: "住宅、共同住宅、寄宿舎、下宿、店舗・事務所等",
        },
    ),
    (
        "第二種中高層住居専用地域",
        ZoningInfo {
            description: "主として中高層住宅の良好な住環境を保護する地域",
            building_height_limit: "15m",
            floor_area_ratio: "100%〜300%",
            land_use_restrictions: "第一種中高層住居専用地域の用途に加え、店舗・事務所等",
        },
    ),
    (
        "第一種住居地域",
        ZoningInfo {
            description: "住居の環境を保護するための地域",
            building_height_limit: "20m",
            floor_area_ratio: "200%〜400%",
            land_use_restrictions: "住宅、共同住宅、寄宿舎、下宿、店舗・事務所、ホテル・旅館等",
        },
    ),
    (
        "第二種住居地域",
        ZoningInfo {
            description: "主として住居の環境を保護するための地域",
            building_height_limit: "20m",
            floor_area_ratio: "200%〜400%",
            land_use_restrictions: "第一種住居地域の用途に加え、店舗・事務所、ホテル・旅館等",
        },
    ),
    (
        "準住居地域",
        ZoningInfo {
            description: "道路の沿道において、自動車関連施設と調和した住居の環境を保護する地域",
            building_height_limit: "20m",
            floor_area_ratio: "200%〜400%",
            land_use_restrictions: "住居地域の用途に加え、自動車関連施設等",
        },
    ),
    (
        "近隣商業地域",
        ZoningInfo {
            description: "近隣の住民が日用品の買物をする店舗等の業務の利便の増進を図る地域",
            building_height_limit: "20m",
            floor_area_ratio: "200%〜400%",
            land_use_restrictions: "店舗・事務所、ホテル・旅館、住宅等",
        },
    ),
    (
        "商業地域",
        ZoningInfo {
            description: "主として商業その他の業務の利便の増進を図る地域",
            building_height_limit: "制限なし",
            floor_area_ratio: "制限なし",
            land_use_restrictions: "店舗・事務所、ホテル・旅館、住宅等",
        },
    ),
    (
        "準工業地域",
        ZoningInfo {
            description: "主として軽工業の環境を保護する地域",
            building_height_limit: "20m",
            floor_area_ratio: "200%〜400%",
            land_use_restrictions: "工場、店舗・事務所、ホテル・旅館、住宅等",
        },
    ),
    (
        "工業地域",
        ZoningInfo {
            description: "主として工業の業務の利便の増進を図る地域",
            building_height_limit: "制限なし",
            floor_area_ratio: "制限なし",
            land_use_restrictions: "工場、店舗・事務所、住宅等",
        },
    ),
    (
        "工業専用地域",
        ZoningInfo {
            description: "工業の業務の利便の増進を図る地域",
            building_height_limit: "制限なし",
            floor_area_ratio: "制限なし",
            land_use_restrictions: "工場のみ",
        },
    ),
];

pub fn zoning_info(zoning_type: &str) -> ZoningInfo {
    let zoning_type = zoning_type.trim();
    ZONING_TABLE
        .iter()
        .find(|(name, _)| *name == zoning_type)
        .map(|(_, info)| *info)
        .unwrap_or(UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_resolve() {
        assert_eq!(ZONING_TABLE.len(), 12);
        let info = zoning_info("工業専用地域");
        assert_eq!(info.land_use_restrictions, "工場のみ");
        assert_eq!(zoning_info("第一種住居地域").building_height_limit, "20m");
    }

    #[test]
    fn unknown_type_gets_placeholder_record() {
        let info = zoning_info("市街化調整区域");
        assert_eq!(info.description, "用途地域の詳細情報がありません");
        assert_eq!(info.floor_area_ratio, "不明");
    }
}
