use minpaku_feasibility::workflows::address::{
    prefecture_of, AddressForms, SearchLevel, NATIONWIDE, PREFECTURES,
};
use proptest::prelude::*;

const CITIES: &[&str] = &["渋谷区", "大阪市北区", "京都市東山区", "札幌市中央区", "長岡市", "那覇市"];
const TOWNS: &[&str] = &["神宮前", "梅田町", "祇園町南側", "殿町", "大手通", ""];
const LOTS: &[&str] = &["1-2-3", "二丁目6", "570", "3丁目4番5号", ""];

fn assert_coarsens(forms: &AddressForms) {
    assert!(forms.raw.starts_with(&forms.block), "{forms:?}");
    assert!(forms.block.starts_with(&forms.city_or_ward), "{forms:?}");
    assert!(forms.city_or_ward.starts_with(&forms.wide_area), "{forms:?}");
    assert!(forms.block.chars().count() >= forms.city_or_ward.chars().count());
    assert!(forms.city_or_ward.chars().count() >= forms.wide_area.chars().count());
}

#[test]
fn shibuya_reduces_to_ward_and_prefecture() {
    let forms = AddressForms::new("  東京都渋谷区神宮前1-2-3 ");
    assert_eq!(forms.raw, "東京都渋谷区神宮前1-2-3");
    assert_eq!(forms.for_level(SearchLevel::Block), "東京都渋谷区");
    assert_eq!(forms.for_level(SearchLevel::CityOrWard), "東京都渋谷区");
    assert_eq!(forms.for_level(SearchLevel::WideArea), "東京都");
    assert_coarsens(&forms);
}

#[test]
fn designated_city_keeps_only_the_city_token() {
    let forms = AddressForms::new("北海道札幌市中央区北1条西2丁目");
    assert_eq!(forms.city_or_ward, "北海道札幌市");
    assert_eq!(forms.wide_area, "北海道");
    assert_coarsens(&forms);
}

#[test]
fn addresses_without_prefecture_search_nationwide() {
    let forms = AddressForms::new("神宮前1-2-3");
    assert_eq!(forms.for_level(SearchLevel::WideArea), NATIONWIDE);
    assert_eq!(forms.for_level(SearchLevel::CityOrWard), "神宮前1-2-3");
}

proptest! {
    #[test]
    fn every_form_is_a_prefix_of_the_finer_one(
        prefecture in prop::sample::select(PREFECTURES.to_vec()),
        city in prop::sample::select(CITIES.to_vec()),
        town in prop::sample::select(TOWNS.to_vec()),
        lot in prop::sample::select(LOTS.to_vec()),
    ) {
        let address = format!("{prefecture}{city}{town}{lot}");
        let forms = AddressForms::new(&address);

        prop_assert_eq!(prefecture_of(&address), Some(prefecture));
        prop_assert_eq!(forms.wide_area.as_str(), prefecture);
        prop_assert!(forms.city_or_ward.starts_with(prefecture));
        prop_assert!(forms.city_or_ward.len() > prefecture.len());
        assert_coarsens(&forms);
        prop_assert_eq!(AddressForms::new(&address), forms);
    }
}
