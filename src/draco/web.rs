//! Browser-side Draco decoding through the Emscripten decoder module served
//! under the configured decoder directory (`draco_wasm_wrapper.js` plus
//! `draco_decoder.wasm`).

use js_sys::{Array, Float32Array, Function, Int8Array, Object, Promise, Reflect, Uint32Array, Uint8Array};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;

use super::{AttributeKind, DracoAttribute, DracoError, DracoMesh, DracoResult};
use crate::assets::fetch_bytes;

const WRAPPER: &str = "draco_wasm_wrapper.js";
const WASM: &str = "draco_decoder.wasm";

fn js_error(context: &str, value: JsValue) -> DracoError {
    DracoError::Decoder(format!("{context}: {value:?}"))
}

fn get(target: &JsValue, key: &str) -> DracoResult<JsValue> {
    Reflect::get(target, &JsValue::from_str(key)).map_err(|e| js_error(key, e))
}

fn call(target: &JsValue, method: &str, args: &[&JsValue]) -> DracoResult<JsValue> {
    let function: Function = get(target, method)?
        .dyn_into()
        .map_err(|e| js_error(method, e))?;
    let list = args.iter().copied().collect::<Array>();
    Reflect::apply(&function, target, &list).map_err(|e| js_error(method, e))
}

fn construct(module: &JsValue, class: &str) -> DracoResult<JsValue> {
    let constructor: Function = get(module, class)?
        .dyn_into()
        .map_err(|e| js_error(class, e))?;
    Reflect::construct(&constructor, &Array::new()).map_err(|e| js_error(class, e))
}

fn number(value: JsValue, what: &str) -> DracoResult<usize> {
    value
        .as_f64()
        .map(|v| v as usize)
        .ok_or_else(|| DracoError::Decoder(format!("{what} is not a number")))
}

/// An instantiated decoder module.
pub struct WebDracoDecoder {
    module: JsValue,
}

impl WebDracoDecoder {
    /// Fetches and instantiates the decoder found under `decoder_dir`.
    pub async fn load(decoder_dir: &str) -> DracoResult<Self> {
        let wrapper_path = format!("{decoder_dir}{WRAPPER}");
        let wrapper = fetch_bytes(&wrapper_path)
            .await
            .map_err(|e| DracoError::Decoder(e.to_string()))?;
        let wrapper = String::from_utf8(wrapper).map_err(|e| DracoError::Decoder(format!("{wrapper_path}: {e}")))?;
        let wasm = fetch_bytes(&format!("{decoder_dir}{WASM}"))
            .await
            .map_err(|e| DracoError::Decoder(e.to_string()))?;

        // The wrapper declares a global factory; evaluate it in a function scope and hand it back.
        let factory: Function = Function::new_no_args(&format!("{wrapper}\nreturn DracoDecoderModule;"))
            .call0(&JsValue::NULL)
            .map_err(|e| js_error("DracoDecoderModule", e))?
            .dyn_into()
            .map_err(|e| js_error("DracoDecoderModule", e))?;

        let config = Object::new();
        Reflect::set(&config, &"wasmBinary".into(), &Uint8Array::from(wasm.as_slice()).buffer())
            .map_err(|e| js_error("wasmBinary", e))?;

        // The module object is thenable, so it travels wrapped to keep the
        // promise from trying to adopt it.
        let loaded = Promise::new(&mut |resolve, _reject| {
            let on_loaded = Closure::once_into_js(move |module: JsValue| {
                let wrapped = Object::new();
                let _ = Reflect::set(&wrapped, &"module".into(), &module);
                let _ = resolve.call1(&JsValue::NULL, &wrapped);
            });
            let _ = Reflect::set(&config, &"onModuleLoaded".into(), &on_loaded);
            let _ = factory.call1(&JsValue::NULL, &config);
        });
        let wrapped = JsFuture::from(loaded)
            .await
            .map_err(|e| js_error("onModuleLoaded", e))?;
        let module = get(&wrapped, "module")?;
        log::info!("Draco decoder loaded from {}", decoder_dir);
        Ok(Self { module })
    }

    /// Decodes one mesh, reading back every attribute id the caller names.
    pub fn decode(&self, data: &[u8], attribute_ids: &[u32]) -> DracoResult<DracoMesh> {
        let module = &self.module;
        let decoder = construct(module, "Decoder")?;
        let mesh = construct(module, "Mesh")?;
        let result = self.decode_into(&decoder, &mesh, data, attribute_ids);
        let _ = call(module, "destroy", &[&mesh]);
        let _ = call(module, "destroy", &[&decoder]);
        result
    }

    fn decode_into(&self, decoder: &JsValue, mesh: &JsValue, data: &[u8], attribute_ids: &[u32]) -> DracoResult<DracoMesh> {
        let array = Int8Array::new(&Uint8Array::from(data).buffer());
        let status = call(
            decoder,
            "DecodeArrayToMesh",
            &[&array, &JsValue::from(data.len() as u32), mesh],
        )?;
        if !call(&status, "ok", &[])?.as_bool().unwrap_or(false) {
            let message = call(&status, "error_msg", &[])?.as_string().unwrap_or_default();
            return Err(DracoError::Decoder(message));
        }

        let num_faces = number(call(mesh, "num_faces", &[])?, "num_faces")?;
        let num_points = number(call(mesh, "num_points", &[])?, "num_points")?;

        let index_count = num_faces * 3;
        let indices = self.with_heap(index_count * 4, |ptr| {
            call(
                decoder,
                "GetTrianglesUInt32Array",
                &[mesh, &JsValue::from((index_count * 4) as u32), &JsValue::from(ptr)],
            )?;
            let heap = get(&get(&self.module, "HEAPF32")?, "buffer")?;
            Ok(Uint32Array::new_with_byte_offset_and_length(&heap, ptr, index_count as u32).to_vec())
        })?;

        let float32 = get(&self.module, "DT_FLOAT32")?;
        let mut attributes = Vec::with_capacity(attribute_ids.len());
        for &unique_id in attribute_ids {
            let attribute = call(decoder, "GetAttributeByUniqueId", &[mesh, &JsValue::from(unique_id)])?;
            if get(&attribute, "ptr")?.as_f64() == Some(0.0) {
                continue;
            }
            let components = number(call(&attribute, "num_components", &[])?, "num_components")?;
            let kind = match number(call(&attribute, "attribute_type", &[])?, "attribute_type")? {
                0 => AttributeKind::Position,
                1 => AttributeKind::Normal,
                2 => AttributeKind::Color,
                3 => AttributeKind::TexCoord,
                _ => AttributeKind::Generic,
            };
            let count = num_points * components;
            let values = self.with_heap(count * 4, |ptr| {
                call(
                    decoder,
                    "GetAttributeDataArrayForAllPoints",
                    &[mesh, &attribute, &float32, &JsValue::from((count * 4) as u32), &JsValue::from(ptr)],
                )?;
                let heap = get(&get(&self.module, "HEAPF32")?, "buffer")?;
                Ok(Float32Array::new_with_byte_offset_and_length(&heap, ptr, count as u32).to_vec())
            })?;
            attributes.push(DracoAttribute {
                unique_id,
                kind,
                components,
                values,
            });
        }

        Ok(DracoMesh {
            num_points,
            indices,
            attributes,
        })
    }

    /// Runs `f` with `len` bytes of module memory, freed afterwards.
    fn with_heap<T>(&self, len: usize, f: impl FnOnce(u32) -> DracoResult<T>) -> DracoResult<T> {
        let ptr = call(&self.module, "_malloc", &[&JsValue::from(len as u32)])?;
        let ptr_value = number(ptr.clone(), "_malloc")? as u32;
        let result = f(ptr_value);
        let _ = call(&self.module, "_free", &[&ptr]);
        result
    }
}
